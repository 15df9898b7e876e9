use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{CacheEntry, Identity, Session, SessionStoreConfig};
use crate::SecurityError;
use crate::crypto::generate_session_id;
use crate::storage::{SessionStorage, StorageEvent};
use crate::token::{Claims, TokenError, TokenValidator};

struct Inner {
    storage: Arc<dyn SessionStorage>,
    validator: TokenValidator,
    config: SessionStoreConfig,
    state: watch::Sender<Option<Session>>,
    // held for a whole load cycle and for writes
    load_lock: tokio::sync::Mutex<()>,
    // number of completed load cycles
    generation: AtomicU64,
    // bumped when another instance removes or replaces the persisted session
    epoch: AtomicU64,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
    }
}

/// Owner of the current session.
///
/// Cloning yields another handle to the same store.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use warden::session::{SessionStore, SessionStoreConfig};
/// use warden::storage::InMemoryStorage;
///
/// let store = SessionStore::new(Arc::new(InMemoryStorage::new()), SessionStoreConfig::default());
/// store.watch_storage();
/// if let Some(session) = store.load().await {
///     println!("signed in as {}", session.identity.email);
/// }
/// ```
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>, config: SessionStoreConfig) -> Self {
        let validator = TokenValidator::new().with_expiration_buffer(config.expiration_buffer);
        let (state, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                storage,
                validator,
                config,
                state,
                load_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                watcher: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionStoreConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.inner.storage
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().as_ref().map(|s| s.identity.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// Receiver that observes every session change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.state.subscribe()
    }

    /// Loads the session from storage.
    ///
    /// Concurrent calls share one cycle: callers that arrive while a cycle
    /// is running wait for it and return its outcome. Failures of any kind
    /// leave the store without a session.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "session.load", skip_all))]
    pub async fn load(&self) -> Option<Session> {
        let observed = self.inner.generation.load(Ordering::Acquire);
        let _guard = self.inner.load_lock.lock().await;
        if self.inner.generation.load(Ordering::Acquire) != observed {
            return self.current();
        }

        self.run_cycle().await
    }

    /// Like [`load`](Self::load), but never joins a cycle already in flight.
    async fn reload(&self) -> Option<Session> {
        let _guard = self.inner.load_lock.lock().await;
        self.run_cycle().await
    }

    fn invalidate(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn invalidated_since(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::Acquire) != epoch
    }

    // caller holds `load_lock`
    async fn run_cycle(&self) -> Option<Session> {
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let session = self.load_cycle(epoch).await;

        let session = if self.invalidated_since(epoch) {
            // the storage changed underneath; whoever invalidated owns the state
            if session.is_some() {
                self.drop_orphaned_cache().await;
            }
            self.current()
        } else {
            self.inner.state.send_replace(session.clone());
            session
        };
        self.inner.generation.fetch_add(1, Ordering::Release);
        session
    }

    async fn load_cycle(&self, epoch: u64) -> Option<Session> {
        let storage = &self.inner.storage;
        let config = &self.inner.config;

        let token = match storage.get(&config.token_key).await {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                log::warn!(target: "warden::session", "msg=\"token read failed\", error=\"{e}\"");
                return None;
            }
        };

        let claims = match self.inner.validator.validate(&token) {
            Ok(claims) => claims,
            Err(reason) => {
                log::info!(
                    target: "warden::session",
                    "msg=\"stored token rejected\", reason=\"{reason}\"",
                );
                self.discard_persisted().await;
                return None;
            }
        };

        let now = Utc::now();
        let expires_at = claims.expires_at();
        let previous = self.current().filter(|s| s.identity.email == claims.email);

        if let Some(previous) = &previous {
            if let Some(cached) = self.read_cache().await {
                let staleness = config.cache_staleness;
                if cached.is_reusable(&previous.session_id, &claims.email, staleness, now) {
                    return Some(Session {
                        last_synced_at: cached.last_synced_at().unwrap_or(now),
                        identity: cached.identity,
                        session_id: cached.session_id,
                        expires_at,
                    });
                }
            }
        }

        let session_id = previous.map_or_else(generate_session_id, |s| s.session_id);
        let session = Session {
            identity: claims.into_identity(),
            session_id,
            last_synced_at: now,
            expires_at,
        };
        if self.invalidated_since(epoch) {
            return None;
        }
        if let Err(e) = self.write_cache(&session).await {
            log::warn!(target: "warden::session", "msg=\"cache write failed\", error=\"{e}\"");
        }
        Some(session)
    }

    async fn read_cache(&self) -> Option<CacheEntry> {
        let raw = self
            .inner
            .storage
            .get(&self.inner.config.cache_key)
            .await
            .ok()
            .flatten()?;
        serde_json::from_str(&raw).ok()
    }

    async fn write_cache(&self, session: &Session) -> Result<(), SecurityError> {
        let entry = serde_json::to_string(&CacheEntry::for_session(session))?;
        self.inner.storage.set(&self.inner.config.cache_key, &entry).await
    }

    /// Removes a cache entry written for a token that is gone.
    async fn drop_orphaned_cache(&self) {
        let config = &self.inner.config;
        if !matches!(self.inner.storage.get(&config.token_key).await, Ok(None)) {
            return;
        }
        if let Err(e) = self.inner.storage.remove(&config.cache_key).await {
            log::warn!(
                target: "warden::session",
                "msg=\"storage remove failed\", key=\"{}\", error=\"{e}\"",
                config.cache_key,
            );
        }
    }

    async fn discard_persisted(&self) {
        let storage = &self.inner.storage;
        for key in [&self.inner.config.token_key, &self.inner.config.cache_key] {
            if let Err(e) = storage.remove(key).await {
                log::warn!(
                    target: "warden::session",
                    "msg=\"storage remove failed\", key=\"{key}\", error=\"{e}\"",
                );
            }
        }
    }

    /// Replaces the current identity.
    ///
    /// `None` is a full logout: the token, the identity cache and every key
    /// with one of the configured prefixes are removed. The in-memory state
    /// is updated even when storage fails.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "session.set", skip_all, err))]
    pub async fn set(&self, identity: Option<Identity>) -> Result<(), SecurityError> {
        let _guard = self.inner.load_lock.lock().await;

        let Some(identity) = identity else {
            self.inner.state.send_replace(None);
            let storage = &self.inner.storage;
            storage.remove(&self.inner.config.token_key).await?;
            storage.remove(&self.inner.config.cache_key).await?;
            let removed = storage.remove_prefixed(&self.inner.config.aux_prefixes).await?;
            log::info!(
                target: "warden::session",
                "msg=\"session cleared\", aux_keys_removed={removed}",
            );
            return Ok(());
        };

        let previous = self.current();
        let same_user = previous.as_ref().is_some_and(|s| s.identity.email == identity.email);
        let session = Session {
            session_id: match previous.as_ref() {
                Some(s) if same_user => s.session_id.clone(),
                _ => generate_session_id(),
            },
            expires_at: previous.filter(|_| same_user).and_then(|s| s.expires_at),
            identity,
            last_synced_at: Utc::now(),
        };
        self.inner.state.send_replace(Some(session.clone()));
        self.write_cache(&session).await
    }

    /// Validates `token`, persists it and starts a new session.
    ///
    /// Storage failures are logged; the in-memory session is established
    /// regardless.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "session.login", skip_all, err))]
    pub async fn login(&self, token: &str) -> Result<Session, TokenError> {
        let claims: Claims = self.inner.validator.validate(token)?;
        let _guard = self.inner.load_lock.lock().await;

        let session = Session {
            expires_at: claims.expires_at(),
            identity: claims.into_identity(),
            session_id: generate_session_id(),
            last_synced_at: Utc::now(),
        };

        if let Err(e) = self.inner.storage.set(&self.inner.config.token_key, token.trim()).await {
            log::warn!(target: "warden::session", "msg=\"token write failed\", error=\"{e}\"");
        }
        if let Err(e) = self.write_cache(&session).await {
            log::warn!(target: "warden::session", "msg=\"cache write failed\", error=\"{e}\"");
        }

        self.inner.state.send_replace(Some(session.clone()));
        log::info!(
            target: "warden::session",
            "msg=\"login success\", email=\"{}\"",
            session.identity.email,
        );
        Ok(session)
    }

    /// Follows changes other instances make to the shared storage.
    ///
    /// Calling it again replaces the previous subscription.
    pub fn watch_storage(&self) {
        let mut events = self.inner.storage.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(
                            target: "warden::session",
                            "msg=\"storage events dropped\", skipped={skipped}",
                        );
                        None
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                let store = SessionStore { inner };
                match event {
                    Some(event) => store.handle_storage_event(&event).await,
                    None => {
                        store.invalidate();
                        store.reload().await;
                    }
                }
            }
        });

        if let Ok(mut watcher) = self.inner.watcher.lock() {
            if let Some(previous) = watcher.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Applies a change observed on the shared storage.
    ///
    /// Token changes force a fresh reload, and a token removal clears the
    /// local session before that reload runs. Removing only the identity
    /// cache drops the local session without re-validating. Either way a
    /// load cycle already in flight is discarded. Events originating from
    /// this store's own storage handle are ignored.
    pub async fn handle_storage_event(&self, event: &StorageEvent) {
        if event.origin == self.inner.storage.instance_id() {
            return;
        }
        let config = &self.inner.config;

        if event.touches(&config.token_key) {
            log::debug!(target: "warden::session", "msg=\"token changed elsewhere, reloading\"");
            self.invalidate();
            if event.new_value.is_none() {
                self.inner.state.send_replace(None);
            }
            self.reload().await;
        } else if event.is_removal_of(&config.cache_key) {
            log::debug!(target: "warden::session", "msg=\"identity cache removed elsewhere\"");
            self.invalidate();
            self.inner.state.send_replace(None);
        }
    }

    /// Stops following storage changes.
    pub fn stop(&self) {
        if let Ok(mut watcher) = self.inner.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
    }
}
