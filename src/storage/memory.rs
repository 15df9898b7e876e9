//! In-memory storage.
//!
//! Suitable for tests and for several instances inside one process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{EVENT_CAPACITY, SessionStorage, StorageEvent};
use crate::SecurityError;

struct Shared {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    next_instance: AtomicU64,
}

/// In-memory storage handle.
///
/// `attach()` returns another handle over the same entries, the way a second
/// browser tab sees the same local storage.
///
/// # Example
///
/// ```rust
/// use warden::storage::{InMemoryStorage, SessionStorage};
///
/// let tab_a = InMemoryStorage::new();
/// let tab_b = tab_a.attach();
/// assert_ne!(tab_a.instance_id(), tab_b.instance_id());
/// ```
#[derive(Clone)]
pub struct InMemoryStorage {
    shared: Arc<Shared>,
    instance_id: u64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                events,
                next_instance: AtomicU64::new(1),
            }),
            instance_id: 0,
        }
    }

    /// New handle over the same data with its own instance id.
    #[must_use]
    pub fn attach(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            instance_id: self.shared.next_instance.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Returns the number of entries currently stored.
    pub fn len(&self) -> usize {
        self.shared.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // no subscribers is fine
        let _ = self.shared.events.send(StorageEvent {
            key: Some(key.to_owned()),
            new_value,
            origin: self.instance_id,
        });
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemoryStorage {
    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SecurityError> {
        let entries = self
            .shared
            .entries
            .read()
            .map_err(|_| SecurityError::Storage("Lock poisoned".to_owned()))?;

        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SecurityError> {
        let previous = self
            .shared
            .entries
            .write()
            .map_err(|_| SecurityError::Storage("Lock poisoned".to_owned()))?
            .insert(key.to_owned(), value.to_owned());

        if previous.as_deref() != Some(value) {
            self.notify(key, Some(value.to_owned()));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SecurityError> {
        let previous = self
            .shared
            .entries
            .write()
            .map_err(|_| SecurityError::Storage("Lock poisoned".to_owned()))?
            .remove(key);

        if previous.is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SecurityError> {
        let entries = self
            .shared
            .entries
            .read()
            .map_err(|_| SecurityError::Storage("Lock poisoned".to_owned()))?;

        Ok(entries.keys().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.events.subscribe()
    }
}
