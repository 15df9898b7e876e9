use std::sync::{Arc, PoisonError, RwLock};

use super::{Listener, SecurityEvent};

/// Listeners of one controller.
///
/// Cloning yields another handle to the same listener list, so components
/// built from one controller share it.
#[derive(Clone, Default)]
pub struct EventRegistry {
    listeners: Arc<RwLock<Vec<Arc<dyn Listener>>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener to receive events.
    ///
    /// Listeners are called in the order they are registered.
    pub fn listen(&self, listener: impl Listener) -> &Self {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch an event to all registered listeners.
    ///
    /// If no listeners are registered, this is a no-op.
    pub async fn dispatch(&self, event: SecurityEvent) {
        let listeners: Vec<Arc<dyn Listener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            listener.handle(&event).await;
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry").field("listeners", &self.len()).finish()
    }
}
