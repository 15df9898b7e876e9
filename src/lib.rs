//! Client-side security and session core.
//!
//! [`SecurityController`] ties together:
//!
//! - [`token`]: structural JWT validation with an expiry safety buffer
//! - [`session`]: the current session, persisted through [`storage`] and
//!   kept consistent across instances sharing that storage
//! - [`activity`]: idle detection with a warning phase
//! - [`poller`]: periodic server-side session checks
//! - [`rate_limit`]: per-identifier sliding-window limiters
//! - [`threat`] and [`validators`]: input screening and sanitization
//!
//! Everything observable is reported through [`events`].

pub mod activity;
pub mod config;
pub mod controller;
pub mod crypto;
pub mod events;
pub mod poller;
pub mod rate_limit;
pub mod session;
pub mod storage;
pub mod threat;
pub mod token;
pub mod validators;

pub use activity::{ActivityMonitor, ActivityPhase};
pub use config::SecurityConfig;
pub use controller::{SecurityController, SecurityControllerBuilder, ThreatRecord};
pub use events::{EventRegistry, Listener, LogoutReason, SecurityEvent};
pub use poller::{SessionBackend, SessionPoller};
pub use rate_limit::{Limit, RateLimitResult, RateLimiter};
pub use session::{Identity, Session, SessionStore};
pub use storage::{FileStorage, InMemoryStorage, SessionStorage};
pub use threat::{ThreatReport, ThreatScanner};
pub use token::{TokenError, TokenValidator};
pub use validators::ValidationError;

/// Failures outside token validation.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session backend error: {0}")]
    Backend(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}
