//! Periodic server-side session checks.
//!
//! [`SessionPoller`] asks a [`SessionBackend`] how long the session has left
//! on a fixed interval and publishes the answer as [`PollerState`].

#[cfg(feature = "http")]
mod http;

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
#[cfg(feature = "http")]
pub use http::HttpSessionBackend;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::SecurityError;
use crate::activity::ActivityMonitor;
use crate::events::{EventRegistry, SecurityEvent};

pub const DEFAULT_SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_EXPIRY_WARNING_THRESHOLD: Duration = Duration::from_secs(5 * 60);

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Server answer to a session check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub expires_in: Duration,
}

/// Server-side view of the session.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Any error means the session is no longer valid.
    async fn check_session(&self) -> Result<SessionStatus, SecurityError>;

    async fn extend_session(&self) -> Result<(), SecurityError>;
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub check_interval: Duration,
    /// Remaining time below which the session counts as expiring.
    pub expiry_warning_threshold: Duration,
    /// Invoke the auth-required hook when a check fails.
    pub require_auth: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_SESSION_CHECK_INTERVAL,
            expiry_warning_threshold: DEFAULT_EXPIRY_WARNING_THRESHOLD,
            require_auth: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerState {
    pub session_valid: bool,
    pub expiring: bool,
    /// Remaining time reported by the last successful check.
    pub remaining: Option<Duration>,
    pub last_error: Option<String>,
}

impl Default for PollerState {
    fn default() -> Self {
        Self {
            session_valid: true,
            expiring: false,
            remaining: None,
            last_error: None,
        }
    }
}

struct Inner {
    backend: Arc<dyn SessionBackend>,
    config: PollerConfig,
    events: EventRegistry,
    monitor: Option<ActivityMonitor>,
    state: watch::Sender<PollerState>,
    on_auth_required: Mutex<Option<Hook>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

pub struct SessionPollerBuilder {
    backend: Arc<dyn SessionBackend>,
    config: PollerConfig,
    events: EventRegistry,
    monitor: Option<ActivityMonitor>,
}

impl SessionPollerBuilder {
    #[must_use]
    pub fn config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn events(mut self, events: EventRegistry) -> Self {
        self.events = events;
        self
    }

    /// Monitor whose activity clock is reset by a successful extension.
    #[must_use]
    pub fn activity_monitor(mut self, monitor: ActivityMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn build(self) -> SessionPoller {
        let (state, _) = watch::channel(PollerState::default());
        SessionPoller {
            inner: Arc::new(Inner {
                backend: self.backend,
                config: self.config,
                events: self.events,
                monitor: self.monitor,
                state,
                on_auth_required: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }
}

/// Polls the backend and tracks session validity and expiry.
///
/// Overlapping checks are harmless: each one replaces the whole state.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use warden::poller::SessionPoller;
///
/// let poller = SessionPoller::builder(Arc::new(backend)).build();
/// poller.on_auth_required(|| println!("redirect to login"));
/// poller.start();
/// ```
#[derive(Clone)]
pub struct SessionPoller {
    inner: Arc<Inner>,
}

impl SessionPoller {
    pub fn builder(backend: Arc<dyn SessionBackend>) -> SessionPollerBuilder {
        SessionPollerBuilder {
            backend,
            config: PollerConfig::default(),
            events: EventRegistry::new(),
            monitor: None,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }

    /// Runs when a check fails and `require_auth` is set.
    pub fn on_auth_required(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .on_auth_required
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Starts polling; the first check runs immediately.
    ///
    /// Does nothing while already running.
    pub fn start(&self) {
        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.check_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                SessionPoller { inner }.check().await;
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs one session check and returns the resulting state.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "poller.check", skip_all))]
    pub async fn check(&self) -> PollerState {
        let inner = &self.inner;

        match inner.backend.check_session().await {
            Ok(status) => {
                let expiring = status.expires_in < inner.config.expiry_warning_threshold;
                let previous = inner.state.send_replace(PollerState {
                    session_valid: true,
                    expiring,
                    remaining: Some(status.expires_in),
                    last_error: None,
                });

                if expiring && !previous.expiring {
                    log::info!(
                        target: "warden::poller",
                        "msg=\"session expiring\", remaining_secs={}",
                        status.expires_in.as_secs()
                    );
                    inner
                        .events
                        .dispatch(SecurityEvent::SessionExpiring {
                            remaining: status.expires_in,
                            at: Utc::now(),
                        })
                        .await;
                }
            }
            Err(e) => {
                log::warn!(target: "warden::poller", "msg=\"session check failed\", error=\"{e}\"");
                let previous = inner.state.send_replace(PollerState {
                    session_valid: false,
                    expiring: false,
                    remaining: None,
                    last_error: Some(e.to_string()),
                });

                if previous.session_valid {
                    inner
                        .events
                        .dispatch(SecurityEvent::SessionInvalid {
                            reason: e.to_string(),
                            at: Utc::now(),
                        })
                        .await;
                }
                if inner.config.require_auth {
                    let hook = inner
                        .on_auth_required
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    if let Some(hook) = hook {
                        hook();
                    }
                }
            }
        }

        self.state()
    }

    /// Asks the backend for more time.
    ///
    /// On success the activity clock restarts and `expiring` clears.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "poller.extend", skip_all, err))]
    pub async fn extend_session(&self) -> Result<(), SecurityError> {
        let inner = &self.inner;

        if let Err(e) = inner.backend.extend_session().await {
            log::warn!(target: "warden::poller", "msg=\"session extension failed\", error=\"{e}\"");
            return Err(e);
        }

        if let Some(monitor) = &inner.monitor {
            monitor.record_activity();
        }
        inner.state.send_modify(|state| state.expiring = false);
        inner
            .events
            .dispatch(SecurityEvent::SessionExtended { at: Utc::now() })
            .await;

        log::info!(target: "warden::poller", "msg=\"session extended\"");
        Ok(())
    }

    pub fn state(&self) -> PollerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.inner.state.subscribe()
    }

    /// Clears the state back to "valid, not expiring".
    pub fn reset(&self) {
        self.inner.state.send_replace(PollerState::default());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::activity::{ActivityConfig, ActivityPhase};

    /// Backend answering from a scripted remaining time; `None` fails.
    struct ScriptedBackend {
        remaining: Mutex<Option<Duration>>,
        extend_ok: bool,
        checks: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(remaining: Option<Duration>) -> Arc<Self> {
            Arc::new(Self {
                remaining: Mutex::new(remaining),
                extend_ok: true,
                checks: AtomicUsize::new(0),
            })
        }

        fn set(&self, remaining: Option<Duration>) {
            *self.remaining.lock().unwrap() = remaining;
        }
    }

    #[async_trait]
    impl SessionBackend for ScriptedBackend {
        async fn check_session(&self) -> Result<SessionStatus, SecurityError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            match *self.remaining.lock().unwrap() {
                Some(expires_in) => Ok(SessionStatus { expires_in }),
                None => Err(SecurityError::Backend("session check returned 401".to_owned())),
            }
        }

        async fn extend_session(&self) -> Result<(), SecurityError> {
            if self.extend_ok {
                Ok(())
            } else {
                Err(SecurityError::Backend("extend refused".to_owned()))
            }
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_check_success() {
        let backend = ScriptedBackend::new(Some(Duration::from_secs(3600)));
        let poller = SessionPoller::builder(backend).build();

        let state = poller.check().await;
        assert!(state.session_valid);
        assert!(!state.expiring);
        assert_eq!(state.remaining, Some(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_check_below_threshold_is_expiring() {
        let backend = ScriptedBackend::new(Some(Duration::from_secs(120)));
        let poller = SessionPoller::builder(backend).build();

        assert!(poller.check().await.expiring);
    }

    #[tokio::test]
    async fn test_failure_marks_invalid_without_hook_by_default() {
        let backend = ScriptedBackend::new(None);
        let poller = SessionPoller::builder(backend).build();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        poller.on_auth_required(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let state = poller.check().await;
        assert!(!state.session_valid);
        assert!(state.last_error.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_with_require_auth_invokes_hook() {
        let backend = ScriptedBackend::new(None);
        let poller = SessionPoller::builder(backend)
            .config(PollerConfig {
                require_auth: true,
                ..Default::default()
            })
            .build();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        poller.on_auth_required(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        poller.check().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovery_replaces_state() {
        let backend = ScriptedBackend::new(None);
        let poller = SessionPoller::builder(backend.clone()).build();

        assert!(!poller.check().await.session_valid);
        backend.set(Some(Duration::from_secs(900)));
        let state = poller.check().await;
        assert!(state.session_valid);
        assert!(state.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_starting_immediately() {
        let backend = ScriptedBackend::new(Some(Duration::from_secs(3600)));
        let poller = SessionPoller::builder(backend.clone()).build();

        poller.start();
        poller.start();
        settle().await;
        assert_eq!(backend.checks.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(backend.checks.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(backend.checks.load(Ordering::SeqCst), 2);

        poller.stop();
        assert!(!poller.is_running());
        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(backend.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_resets_activity_and_expiring() {
        let backend = ScriptedBackend::new(Some(Duration::from_secs(60)));
        let monitor = ActivityMonitor::new(ActivityConfig::default());
        monitor.start();
        let poller = SessionPoller::builder(backend)
            .activity_monitor(monitor.clone())
            .build();

        tokio::time::advance(Duration::from_secs(26 * 60)).await;
        settle().await;
        assert_eq!(monitor.phase(), ActivityPhase::Warning);
        assert!(poller.check().await.expiring);

        poller.extend_session().await.unwrap();

        assert_eq!(monitor.phase(), ActivityPhase::Active);
        assert_eq!(monitor.time_until_idle(), Duration::from_secs(30 * 60));
        assert!(!poller.state().expiring);
        monitor.stop();
    }

    #[tokio::test]
    async fn test_failed_extend_keeps_state() {
        let backend = Arc::new(ScriptedBackend {
            remaining: Mutex::new(Some(Duration::from_secs(60))),
            extend_ok: false,
            checks: AtomicUsize::new(0),
        });
        let poller = SessionPoller::builder(backend).build();
        poller.check().await;

        assert!(matches!(
            poller.extend_session().await,
            Err(SecurityError::Backend(_))
        ));
        assert!(poller.state().expiring);
    }
}
