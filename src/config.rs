//! Configuration for the security controller.
//!
//! One [`SecurityConfig`] is injected at construction and split into the
//! per-component configurations.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use warden::config::SecurityConfig;
//!
//! // Use defaults
//! let config = SecurityConfig::default();
//!
//! // Or customize
//! let config = SecurityConfig {
//!     require_auth: true,
//!     idle_timeout: Duration::from_secs(15 * 60),
//!     warning_window: Duration::from_secs(2 * 60),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::SecurityError;
use crate::activity::{
    ActivityConfig, DEFAULT_CHECK_INTERVAL, DEFAULT_IDLE_TIMEOUT, DEFAULT_WARNING_WINDOW,
};
use crate::poller::{DEFAULT_EXPIRY_WARNING_THRESHOLD, DEFAULT_SESSION_CHECK_INTERVAL, PollerConfig};
use crate::rate_limit::Limit;
use crate::session::{DEFAULT_CACHE_STALENESS, SessionStoreConfig};
use crate::token::DEFAULT_EXPIRATION_BUFFER;

/// Main configuration of a [`SecurityController`](crate::SecurityController).
///
/// Use `SecurityConfig::default()` for production defaults.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Treat a failed session check as "authentication required".
    ///
    /// Default: false
    pub require_auth: bool,

    /// Poll the session backend periodically.
    ///
    /// Default: true
    pub enable_session_monitoring: bool,

    /// Log out after `idle_timeout` without activity.
    ///
    /// Default: true
    pub enable_idle_timeout: bool,

    /// Log rejected input and rate-limit denials.
    ///
    /// Default: true
    pub enable_security_logging: bool,

    /// Default: 30 minutes
    pub idle_timeout: Duration,

    /// Length of the warning phase before `idle_timeout`.
    ///
    /// Default: 5 minutes
    pub warning_window: Duration,

    /// Default: 60 seconds
    pub activity_check_interval: Duration,

    /// Default: 30 seconds
    pub session_check_interval: Duration,

    /// Remaining server-side time below which the session is expiring.
    ///
    /// Default: 5 minutes
    pub expiry_warning_threshold: Duration,

    /// Maximum age of a reusable identity cache. Independent of
    /// `warning_window`.
    ///
    /// Default: 5 minutes
    pub cache_staleness: Duration,

    /// Tokens expiring within this window are refused.
    ///
    /// Default: 5 minutes
    pub expiration_buffer: Duration,

    /// Threat records kept before the oldest are dropped.
    ///
    /// Default: 100
    pub max_threat_records: usize,

    pub rate_limits: RateLimitConfig,

    /// Where the session is persisted.
    pub storage: SessionStoreConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_auth: false,
            enable_session_monitoring: true,
            enable_idle_timeout: true,
            enable_security_logging: true,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            warning_window: DEFAULT_WARNING_WINDOW,
            activity_check_interval: DEFAULT_CHECK_INTERVAL,
            session_check_interval: DEFAULT_SESSION_CHECK_INTERVAL,
            expiry_warning_threshold: DEFAULT_EXPIRY_WARNING_THRESHOLD,
            cache_staleness: DEFAULT_CACHE_STALENESS,
            expiration_buffer: DEFAULT_EXPIRATION_BUFFER,
            max_threat_records: 100,
            rate_limits: RateLimitConfig::default(),
            storage: SessionStoreConfig::default(),
        }
    }
}

impl SecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration suitable for development/testing.
    ///
    /// Long idle timeout, no session polling and lenient rate limits.
    pub fn development() -> Self {
        Self {
            enable_session_monitoring: false,
            idle_timeout: Duration::from_secs(8 * 60 * 60),
            warning_window: Duration::from_secs(10 * 60),
            rate_limits: RateLimitConfig {
                generic: Limit::per_minute(500),
                search: Limit::per_minute(300),
                favorites: Limit::per_minute(200),
            },
            ..Self::default()
        }
    }

    /// Creates a configuration with stricter security settings.
    ///
    /// Requires authentication, shorter idle timeout and tighter limits.
    pub fn strict() -> Self {
        Self {
            require_auth: true,
            idle_timeout: Duration::from_secs(15 * 60),
            warning_window: Duration::from_secs(2 * 60),
            session_check_interval: Duration::from_secs(15),
            expiry_warning_threshold: Duration::from_secs(10 * 60),
            cache_staleness: Duration::from_secs(60),
            expiration_buffer: Duration::from_secs(10 * 60),
            rate_limits: RateLimitConfig {
                generic: Limit::per_minute(20),
                search: Limit::per_minute(10).message("Too many searches. Please slow down."),
                favorites: Limit::per_minute(10),
            },
            ..Self::default()
        }
    }

    /// Rejects inconsistent values.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Configuration`] naming the first problem.
    pub fn validate(&self) -> Result<(), SecurityError> {
        let invalid = |msg: &str| Err(SecurityError::Configuration(msg.to_owned()));

        if let Err(msg) = self.activity_config().validate() {
            return invalid(msg);
        }
        if self.session_check_interval.is_zero() {
            return invalid("session_check_interval must be positive");
        }
        if self.cache_staleness.is_zero() {
            return invalid("cache_staleness must be positive");
        }
        if self.max_threat_records == 0 {
            return invalid("max_threat_records must be positive");
        }
        if let Err(msg) = self.rate_limits.validate() {
            return invalid(msg);
        }
        if let Err(msg) = self.storage.validate() {
            return invalid(msg);
        }
        Ok(())
    }

    pub fn activity_config(&self) -> ActivityConfig {
        ActivityConfig {
            idle_timeout: self.idle_timeout,
            warning_window: self.warning_window,
            check_interval: self.activity_check_interval,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            check_interval: self.session_check_interval,
            expiry_warning_threshold: self.expiry_warning_threshold,
            require_auth: self.require_auth,
        }
    }

    pub fn session_store_config(&self) -> SessionStoreConfig {
        SessionStoreConfig {
            cache_staleness: self.cache_staleness,
            expiration_buffer: self.expiration_buffer,
            ..self.storage.clone()
        }
    }
}

/// Limits of the built-in named rate limiters.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Default: 50 per minute
    pub generic: Limit,
    /// Default: 30 per minute
    pub search: Limit,
    /// Default: 20 per minute
    pub favorites: Limit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            generic: Limit::generic(),
            search: Limit::search(),
            favorites: Limit::favorites(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        self.generic.validate()?;
        self.search.validate()?;
        self.favorites.validate()
    }
}
