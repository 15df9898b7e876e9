//! File-based storage.
//!
//! Stores every key in one JSON object on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{EVENT_CAPACITY, SessionStorage, StorageEvent};
use crate::SecurityError;

struct Shared {
    path: PathBuf,
    // serializes read-modify-write cycles between handles
    write_lock: Mutex<()>,
    events: broadcast::Sender<StorageEvent>,
    next_instance: AtomicU64,
}

/// File-based storage.
///
/// Values live in a single JSON document that is replaced atomically
/// (write to `<file>.tmp`, then rename). Handles obtained through
/// `attach()` share the file and receive each other's change events.
/// Writers in other processes are not observed.
///
/// # Example
///
/// ```rust,ignore
/// use warden::storage::FileStorage;
///
/// let storage = FileStorage::open("/var/lib/myapp/session.json")?;
/// let other_window = storage.attach();
/// ```
#[derive(Clone)]
pub struct FileStorage {
    shared: Arc<Shared>,
    instance_id: u64,
}

impl FileStorage {
    /// Opens (or prepares) the storage file.
    ///
    /// Creates the parent directory if it doesn't exist. The file itself is
    /// created on first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SecurityError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SecurityError::Storage(format!("Failed to create storage directory: {e}"))
            })?;
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                path,
                write_lock: Mutex::new(()),
                events,
                next_instance: AtomicU64::new(1),
            }),
            instance_id: 0,
        })
    }

    /// New handle over the same file with its own instance id.
    #[must_use]
    pub fn attach(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            instance_id: self.shared.next_instance.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, SecurityError> {
        let path = &self.shared.path;
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SecurityError::Storage(format!("Failed to read storage file: {e}")))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| SecurityError::Storage(format!("Failed to parse storage file: {e}")))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), SecurityError> {
        let content = serde_json::to_string_pretty(entries)?;

        let mut tmp = self.shared.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content)
            .map_err(|e| SecurityError::Storage(format!("Failed to write storage file: {e}")))?;
        std::fs::rename(&tmp, &self.shared.path)
            .map_err(|e| SecurityError::Storage(format!("Failed to replace storage file: {e}")))?;

        Ok(())
    }

    /// Applies `change` under the write lock; returns whether it altered the file.
    fn modify(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<bool, SecurityError> {
        let _guard = self
            .shared
            .write_lock
            .lock()
            .map_err(|_| SecurityError::Storage("Lock poisoned".to_owned()))?;

        let mut entries = self.read_all()?;
        if !change(&mut entries) {
            return Ok(false);
        }
        self.write_all(&entries)?;
        Ok(true)
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        let _ = self.shared.events.send(StorageEvent {
            key: Some(key.to_owned()),
            new_value,
            origin: self.instance_id,
        });
    }
}

#[async_trait]
impl SessionStorage for FileStorage {
    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SecurityError> {
        Ok(self.read_all()?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SecurityError> {
        let changed = self.modify(|entries| {
            entries.insert(key.to_owned(), value.to_owned()).as_deref() != Some(value)
        })?;

        if changed {
            self.notify(key, Some(value.to_owned()));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SecurityError> {
        let changed = self.modify(|entries| entries.remove(key).is_some())?;

        if changed {
            self.notify(key, None);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SecurityError> {
        Ok(self.read_all()?.into_keys().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.events.subscribe()
    }
}
