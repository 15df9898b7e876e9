//! The security controller facade.
//!
//! [`SecurityController`] wires the session store, the activity monitor, the
//! session poller, the rate limiters and the threat scanner together and is
//! the single entry point UI code talks to.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::SecurityError;
use crate::activity::{ActivityMonitor, ActivityPhase, ActivitySource};
use crate::config::SecurityConfig;
use crate::events::{EventRegistry, Listener, LogoutReason, SecurityEvent};
use crate::poller::{SessionBackend, SessionPoller};
use crate::rate_limit::{self, RateLimitResult, RateLimiter};
use crate::session::{Identity, Session, SessionStore};
use crate::storage::{InMemoryStorage, SessionStorage};
use crate::threat::{PatternId, ThreatScanner};
use crate::token::TokenError;

/// Input rejected by [`SecurityController::validate_input`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreatRecord {
    pub context: String,
    pub threats: Vec<PatternId>,
    pub timestamp: DateTime<Utc>,
}

pub struct SecurityControllerBuilder {
    config: SecurityConfig,
    storage: Option<Arc<dyn SessionStorage>>,
    backend: Option<Arc<dyn SessionBackend>>,
    sources: Vec<Arc<dyn ActivitySource>>,
    scanner: ThreatScanner,
    events: EventRegistry,
}

impl SecurityControllerBuilder {
    /// Persisted storage shared with other instances. Defaults to a private
    /// [`InMemoryStorage`].
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Backend for session checks and extensions. Without one, no polling
    /// takes place.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn activity_source(mut self, source: Arc<dyn ActivitySource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn scanner(mut self, scanner: ThreatScanner) -> Self {
        self.scanner = scanner;
        self
    }

    #[must_use]
    pub fn listener(self, listener: impl Listener) -> Self {
        self.events.listen(listener);
        self
    }

    /// # Errors
    ///
    /// Returns [`SecurityError::Configuration`] if the configuration is
    /// inconsistent.
    pub fn build(self) -> Result<SecurityController, SecurityError> {
        let config = self.config;
        config.validate()?;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let store = SessionStore::new(storage, config.session_store_config());

        let monitor = ActivityMonitor::new(config.activity_config());
        for source in self.sources {
            monitor.add_source(source);
        }

        let poller = self.backend.map(|backend| {
            SessionPoller::builder(backend)
                .config(config.poller_config())
                .events(self.events.clone())
                .activity_monitor(monitor.clone())
                .build()
        });

        let rate_limiter = RateLimiter::new()
            .for_(rate_limit::GENERIC, config.rate_limits.generic.clone())
            .for_(rate_limit::SEARCH, config.rate_limits.search.clone())
            .for_(rate_limit::FAVORITES, config.rate_limits.favorites.clone());

        let controller = SecurityController {
            inner: Arc::new(Inner {
                config,
                store,
                monitor,
                poller,
                rate_limiter,
                scanner: self.scanner,
                events: self.events,
                threats: Mutex::new(VecDeque::new()),
                session_bridge: Mutex::new(None),
            }),
        };
        controller.install_hooks();
        Ok(controller)
    }
}

struct Inner {
    config: SecurityConfig,
    store: SessionStore,
    monitor: ActivityMonitor,
    poller: Option<SessionPoller>,
    rate_limiter: RateLimiter,
    scanner: ThreatScanner,
    events: EventRegistry,
    threats: Mutex<VecDeque<ThreatRecord>>,
    session_bridge: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn threats(&self) -> MutexGuard<'_, VecDeque<ThreatRecord>> {
        self.threats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_bridge(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.session_bridge.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(bridge) = self
            .session_bridge
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            bridge.abort();
        }
        self.store.stop();
        self.monitor.stop();
        if let Some(poller) = &self.poller {
            poller.stop();
        }
    }
}

/// Security and session facade.
///
/// Cloning yields another handle to the same controller.
///
/// # Example
///
/// ```rust,ignore
/// use warden::{SecurityConfig, SecurityController};
/// use warden::events::listeners::LoggingListener;
///
/// let controller = SecurityController::builder(SecurityConfig::default())
///     .listener(LoggingListener::new())
///     .build()?;
///
/// controller.start().await;
/// if !controller.validate_input(&query, "search").await {
///     return;
/// }
/// if !controller.check_named_rate_limit("search", &user_id).await {
///     return;
/// }
/// ```
#[derive(Clone)]
pub struct SecurityController {
    inner: Arc<Inner>,
}

impl SecurityController {
    pub fn builder(config: SecurityConfig) -> SecurityControllerBuilder {
        SecurityControllerBuilder {
            config,
            storage: None,
            backend: None,
            sources: Vec::new(),
            scanner: ThreatScanner::new(),
            events: EventRegistry::new(),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn install_hooks(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.monitor.on_warning(move || {
            if let Some(controller) = Self::from_weak(&weak) {
                tokio::spawn(async move {
                    controller
                        .inner
                        .events
                        .dispatch(SecurityEvent::IdleWarning { at: Utc::now() })
                        .await;
                });
            }
        });

        let weak = Arc::downgrade(&self.inner);
        self.inner.monitor.on_idle(move || {
            if let Some(controller) = Self::from_weak(&weak) {
                tokio::spawn(async move {
                    controller
                        .inner
                        .events
                        .dispatch(SecurityEvent::IdleTimeout { at: Utc::now() })
                        .await;
                    controller.logout(LogoutReason::IdleTimeout).await;
                });
            }
        });

        if let Some(poller) = &self.inner.poller {
            let weak = Arc::downgrade(&self.inner);
            poller.on_auth_required(move || {
                if let Some(controller) = Self::from_weak(&weak) {
                    tokio::spawn(async move {
                        controller.logout(LogoutReason::SessionInvalid).await;
                    });
                }
            });
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn monitor(&self) -> &ActivityMonitor {
        &self.inner.monitor
    }

    pub fn poller(&self) -> Option<&SessionPoller> {
        self.inner.poller.as_ref()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    /// Loads the persisted session and starts following it.
    ///
    /// Monitoring runs while a session exists: it starts here or on a later
    /// login, and stops when the session disappears.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "controller.start", skip_all))]
    pub async fn start(&self) -> Option<Session> {
        self.arm();
        let session = self.inner.store.load().await;

        if let Some(session) = &session {
            self.start_monitoring();
            self.inner
                .events
                .dispatch(SecurityEvent::SessionLoaded {
                    email: session.identity.email.clone(),
                    at: Utc::now(),
                })
                .await;
        }
        session
    }

    /// Follows storage changes and session transitions. Idempotent.
    fn arm(&self) {
        let mut bridge = self.inner.session_bridge();
        if bridge.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        self.inner.store.watch_storage();

        let mut sessions = self.inner.store.subscribe();
        sessions.mark_unchanged();
        let weak = Arc::downgrade(&self.inner);
        *bridge = Some(tokio::spawn(async move {
            while sessions.changed().await.is_ok() {
                let authenticated = sessions.borrow_and_update().is_some();
                let Some(controller) = Self::from_weak(&weak) else { break };

                if authenticated {
                    controller.start_monitoring();
                } else {
                    controller.stop_monitoring();
                    controller
                        .inner
                        .events
                        .dispatch(SecurityEvent::SessionCleared { at: Utc::now() })
                        .await;
                }
            }
        }));
    }

    fn disarm(&self) {
        if let Some(bridge) = self.inner.session_bridge().take() {
            bridge.abort();
        }
        self.inner.store.stop();
        self.stop_monitoring();
    }

    fn start_monitoring(&self) {
        let config = &self.inner.config;
        if config.enable_idle_timeout && !self.inner.monitor.is_running() {
            self.inner.monitor.start();
        }
        if config.enable_session_monitoring {
            if let Some(poller) = &self.inner.poller {
                poller.start();
            }
        }
    }

    fn stop_monitoring(&self) {
        self.inner.monitor.stop();
        if let Some(poller) = &self.inner.poller {
            poller.stop();
        }
    }

    /// Validates `token` and establishes a session from it.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "controller.login", skip_all, err))]
    pub async fn login(&self, token: &str) -> Result<Session, TokenError> {
        let session = self.inner.store.login(token).await?;

        if let Some(poller) = &self.inner.poller {
            poller.reset();
        }
        self.arm();
        self.start_monitoring();
        self.inner.monitor.record_activity();

        self.inner
            .events
            .dispatch(SecurityEvent::SessionLoaded {
                email: session.identity.email.clone(),
                at: Utc::now(),
            })
            .await;
        Ok(session)
    }

    /// Asks the backend for more time and restarts the idle clock.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Configuration`] when no backend is set, or
    /// the backend's error.
    pub async fn extend_session(&self) -> Result<(), SecurityError> {
        match &self.inner.poller {
            Some(poller) => poller.extend_session().await,
            None => Err(SecurityError::Configuration(
                "no session backend configured".to_owned(),
            )),
        }
    }

    /// Clears the session and cancels every timer, interval and subscription.
    pub async fn force_logout(&self) {
        self.logout(LogoutReason::Manual).await;
    }

    async fn logout(&self, reason: LogoutReason) {
        self.disarm();

        if let Err(e) = self.inner.store.set(None).await {
            log::warn!(
                target: "warden::controller",
                "msg=\"failed to clear persisted session\", error=\"{e}\"",
            );
        }

        log::info!(
            target: "warden::controller",
            "msg=\"logged out\", reason=\"{}\"",
            reason.as_str(),
        );
        self.inner
            .events
            .dispatch(SecurityEvent::SessionCleared { at: Utc::now() })
            .await;
        self.inner
            .events
            .dispatch(SecurityEvent::LoggedOut {
                reason,
                at: Utc::now(),
            })
            .await;
    }

    /// Screens `input` and records a threat when it is unsafe.
    ///
    /// `context` names where the input came from, for example `"search"`.
    pub async fn validate_input(&self, input: &str, context: &str) -> bool {
        let report = self.inner.scanner.scan(input);
        if report.is_safe() {
            return true;
        }

        let threats = report.into_patterns();
        if self.inner.config.enable_security_logging {
            let names: Vec<&str> = threats.iter().map(|id| id.name()).collect();
            log::warn!(
                target: "warden::security",
                "msg=\"threat detected\", context=\"{context}\", patterns=\"{}\"",
                names.join(",")
            );
        }

        let timestamp = Utc::now();
        {
            let mut records = self.inner.threats();
            while records.len() >= self.inner.config.max_threat_records {
                records.pop_front();
            }
            records.push_back(ThreatRecord {
                context: context.to_owned(),
                threats: threats.clone(),
                timestamp,
            });
        }

        self.inner
            .events
            .dispatch(SecurityEvent::ThreatDetected {
                context: context.to_owned(),
                threats,
                at: timestamp,
            })
            .await;
        false
    }

    /// Checks the generic limiter.
    pub async fn check_rate_limit(&self, identifier: &str) -> bool {
        self.check_named_rate_limit(rate_limit::GENERIC, identifier).await
    }

    /// Checks a named limiter. Unknown names deny.
    pub async fn check_named_rate_limit(&self, name: &str, identifier: &str) -> bool {
        match self.inner.rate_limiter.hit(name, identifier) {
            Ok(RateLimitResult::Allowed { .. }) => true,
            Ok(RateLimitResult::Limited { retry_after, .. }) => {
                if self.inner.config.enable_security_logging {
                    log::warn!(
                        target: "warden::security",
                        "msg=\"rate limit exceeded\", limiter=\"{name}\", identifier=\"{identifier}\", retry_after_ms={}",
                        retry_after.as_millis()
                    );
                }
                self.inner
                    .events
                    .dispatch(SecurityEvent::RateLimited {
                        limiter: name.to_owned(),
                        identifier: identifier.to_owned(),
                        at: Utc::now(),
                    })
                    .await;
                false
            }
            Err(e) => {
                log::error!(
                    target: "warden::security",
                    "msg=\"rate limit check failed\", error=\"{e}\"",
                );
                false
            }
        }
    }

    pub fn threats(&self) -> Vec<ThreatRecord> {
        self.inner.threats().iter().cloned().collect()
    }

    pub fn clear_threats(&self) {
        self.inner.threats().clear();
    }

    pub fn record_activity(&self) {
        self.inner.monitor.record_activity();
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.store.current()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.store.identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_authenticated()
    }

    /// Authenticated and not refused by the last session check.
    pub fn session_valid(&self) -> bool {
        self.is_authenticated()
            && self
                .inner
                .poller
                .as_ref()
                .is_none_or(|poller| poller.state().session_valid)
    }

    pub fn is_expiring(&self) -> bool {
        self.inner
            .poller
            .as_ref()
            .is_some_and(|poller| poller.state().expiring)
    }

    /// Server-reported remaining time, else time until the token expires.
    pub fn remaining_time(&self) -> Option<Duration> {
        if let Some(remaining) = self.inner.poller.as_ref().and_then(|p| p.state().remaining) {
            return Some(remaining);
        }
        let expires_at = self.inner.store.current()?.expires_at?;
        Some((expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn activity_phase(&self) -> ActivityPhase {
        self.inner.monitor.phase()
    }

    /// No unresolved threat records and a valid session.
    pub fn is_secure(&self) -> bool {
        self.inner.threats().is_empty() && self.session_valid()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;
    use crate::poller::SessionStatus;
    use crate::rate_limit::Limit;

    fn mint(email: &str, ttl_secs: i64) -> String {
        let claims = json!({
            "email": email,
            "exp": Utc::now().timestamp() + ttl_secs,
        });
        let key = EncodingKey::from_secret(b"test-secret-32-bytes-long-key-01");
        jsonwebtoken::encode(&Header::default(), &claims, &key).unwrap()
    }

    struct Recorder {
        names: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Listener for Recorder {
        async fn handle(&self, event: &SecurityEvent) {
            self.names.lock().unwrap().push(event.name());
        }
    }

    struct RefusingBackend {
        checks: AtomicUsize,
    }

    #[async_trait]
    impl SessionBackend for RefusingBackend {
        async fn check_session(&self) -> Result<SessionStatus, SecurityError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Err(SecurityError::Backend("session check returned 401".to_owned()))
        }

        async fn extend_session(&self) -> Result<(), SecurityError> {
            Err(SecurityError::Backend("refused".to_owned()))
        }
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    fn controller(config: SecurityConfig) -> (SecurityController, Arc<Mutex<Vec<&'static str>>>) {
        let names = Arc::new(Mutex::new(Vec::new()));
        let controller = SecurityController::builder(config)
            .listener(Recorder {
                names: Arc::clone(&names),
            })
            .build()
            .unwrap();
        (controller, names)
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = SecurityConfig {
            max_threat_records: 0,
            ..Default::default()
        };
        assert!(matches!(
            SecurityController::builder(config).build(),
            Err(SecurityError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_input_records_threats() {
        let (controller, names) = controller(SecurityConfig::default());

        assert!(controller.validate_input("hello world", "comment").await);
        assert!(controller.threats().is_empty());

        assert!(!controller.validate_input("<script>alert(1)</script>", "comment").await);
        let records = controller.threats();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context, "comment");
        assert!(records[0].threats.contains(&PatternId::XssScriptTag));
        assert_eq!(*names.lock().unwrap(), vec!["security.threat_detected"]);

        controller.clear_threats();
        assert!(controller.threats().is_empty());
    }

    #[tokio::test]
    async fn test_threat_records_are_bounded() {
        let (controller, _) = controller(SecurityConfig {
            max_threat_records: 3,
            ..Default::default()
        });

        for i in 0..5 {
            let context = format!("field-{i}");
            assert!(!controller.validate_input("../../etc/passwd", &context).await);
        }

        let contexts: Vec<String> = controller.threats().into_iter().map(|r| r.context).collect();
        assert_eq!(contexts, vec!["field-2", "field-3", "field-4"]);
    }

    #[tokio::test]
    async fn test_rate_limits() {
        let mut config = SecurityConfig::default();
        config.rate_limits.generic = Limit::per_minute(2);
        let (controller, names) = controller(config);

        assert!(controller.check_rate_limit("alice").await);
        assert!(controller.check_rate_limit("alice").await);
        assert!(!controller.check_rate_limit("alice").await);
        assert!(controller.check_rate_limit("bob").await);
        assert_eq!(*names.lock().unwrap(), vec!["security.rate_limited"]);

        assert!(controller.check_named_rate_limit("search", "alice").await);
        assert!(!controller.check_named_rate_limit("unknown", "alice").await);
    }

    #[tokio::test]
    async fn test_login_and_force_logout() {
        let (controller, names) = controller(SecurityConfig::default());
        assert!(controller.start().await.is_none());
        assert!(!controller.is_secure());

        assert_eq!(
            controller.login("invalid-token").await.unwrap_err(),
            TokenError::MalformedStructure
        );

        let session = controller.login(&mint("alice@example.com", 3600)).await.unwrap();
        assert_eq!(session.identity.role, "user");
        assert!(controller.is_authenticated());
        assert!(controller.session_valid());
        assert!(controller.is_secure());
        assert!(controller.monitor().is_running());
        assert_eq!(controller.activity_phase(), ActivityPhase::Active);
        let remaining = controller.remaining_time().unwrap();
        assert!(remaining > Duration::from_secs(3500));

        controller.force_logout().await;
        settle().await;

        assert!(!controller.is_authenticated());
        assert!(!controller.monitor().is_running());
        assert!(controller.store().storage().get("auth_token").await.unwrap().is_none());

        let names = names.lock().unwrap().clone();
        assert_eq!(names.first(), Some(&"session.loaded"));
        assert_eq!(names.last(), Some(&"session.logged_out"));
    }

    #[tokio::test]
    async fn test_threats_make_session_insecure() {
        let (controller, _) = controller(SecurityConfig::default());
        controller.login(&mint("alice@example.com", 3600)).await.unwrap();
        assert!(controller.is_secure());

        controller.validate_input("1' OR '1'='1", "login").await;
        assert!(!controller.is_secure());

        controller.clear_threats();
        assert!(controller.is_secure());
    }

    #[tokio::test]
    async fn test_extend_without_backend() {
        let (controller, _) = controller(SecurityConfig::default());
        assert!(matches!(
            controller.extend_session().await,
            Err(SecurityError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_required_auth_failure_logs_out() {
        let backend = Arc::new(RefusingBackend {
            checks: AtomicUsize::new(0),
        });
        let names = Arc::new(Mutex::new(Vec::new()));
        let controller = SecurityController::builder(SecurityConfig {
            require_auth: true,
            ..Default::default()
        })
        .backend(backend.clone())
        .listener(Recorder {
            names: Arc::clone(&names),
        })
        .build()
        .unwrap();

        controller.login(&mint("alice@example.com", 3600)).await.unwrap();
        // the first check is due immediately; let the timer driver fire it
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;

        assert!(backend.checks.load(Ordering::SeqCst) >= 1);
        assert!(!controller.is_authenticated());
        assert!(!controller.poller().unwrap().is_running());
        let names = names.lock().unwrap().clone();
        assert!(names.contains(&"session.invalid"));
        assert_eq!(names.last(), Some(&"session.logged_out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_logs_out() {
        let (controller, names) = controller(SecurityConfig::default());
        controller.login(&mint("alice@example.com", 3600)).await.unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(25 * 60)).await;
        settle().await;
        assert_eq!(controller.activity_phase(), ActivityPhase::Warning);

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        settle().await;

        assert!(!controller.is_authenticated());
        let names = names.lock().unwrap().clone();
        assert!(names.contains(&"activity.idle_warning"));
        assert!(names.contains(&"activity.idle_timeout"));
        assert_eq!(names.last(), Some(&"session.logged_out"));
    }
}
