//! Persisted, cross-instance key/value storage.
//!
//! The session store keeps the bearer token and its identity cache here.
//! Several instances (browser tabs, windows, processes sharing a profile)
//! see the same data and are told about each other's writes through
//! [`StorageEvent`] notifications.
//!
//! Implementations:
//! - [`InMemoryStorage`]: shared map, one handle per instance via `attach()`
//! - [`FileStorage`]: one JSON document on disk

mod file;
mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use file::FileStorage;
pub use memory::InMemoryStorage;

use crate::SecurityError;

/// Buffered notifications per subscriber before the oldest are dropped.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// A change made through one storage handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Changed key, or `None` when the whole store was cleared.
    pub key: Option<String>,
    /// Value after the change; `None` means removed.
    pub new_value: Option<String>,
    /// `instance_id` of the handle that made the change.
    pub origin: u64,
}

impl StorageEvent {
    pub fn is_removal_of(&self, key: &str) -> bool {
        self.new_value.is_none() && self.key.as_deref().is_none_or(|k| k == key)
    }

    pub fn touches(&self, key: &str) -> bool {
        self.key.as_deref().is_none_or(|k| k == key)
    }
}

/// Storage shared between instances.
///
/// Writes are last-writer-wins. Every handle has its own `instance_id`;
/// subscribers receive events from all handles and filter on `origin`.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    fn instance_id(&self) -> u64;

    async fn get(&self, key: &str) -> Result<Option<String>, SecurityError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), SecurityError>;

    async fn remove(&self, key: &str) -> Result<(), SecurityError>;

    async fn keys(&self) -> Result<Vec<String>, SecurityError>;

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;

    /// Removes every key starting with one of `prefixes`.
    async fn remove_prefixed(&self, prefixes: &[String]) -> Result<usize, SecurityError> {
        let mut removed = 0;
        for key in self.keys().await? {
            if prefixes.iter().any(|prefix| key.starts_with(prefix.as_str())) {
                self.remove(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
