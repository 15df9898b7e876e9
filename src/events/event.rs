use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::threat::PatternId;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// Explicit `force_logout`.
    Manual,
    IdleTimeout,
    /// The backend refused the session and authentication is required.
    SessionInvalid,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::IdleTimeout => "idle_timeout",
            Self::SessionInvalid => "session_invalid",
        }
    }
}

/// Security events emitted by a controller and its components.
///
/// Events without registered listeners are dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEvent {
    // input screening
    ThreatDetected {
        context: String,
        threats: Vec<PatternId>,
        at: DateTime<Utc>,
    },
    RateLimited {
        limiter: String,
        identifier: String,
        at: DateTime<Utc>,
    },

    // session lifecycle
    SessionLoaded {
        email: String,
        at: DateTime<Utc>,
    },
    SessionCleared {
        at: DateTime<Utc>,
    },
    SessionExpiring {
        remaining: Duration,
        at: DateTime<Utc>,
    },
    SessionInvalid {
        reason: String,
        at: DateTime<Utc>,
    },
    SessionExtended {
        at: DateTime<Utc>,
    },
    LoggedOut {
        reason: LogoutReason,
        at: DateTime<Utc>,
    },

    // activity
    IdleWarning {
        at: DateTime<Utc>,
    },
    IdleTimeout {
        at: DateTime<Utc>,
    },
}

impl SecurityEvent {
    /// Returns a dot-separated event name for logging/tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ThreatDetected { .. } => "security.threat_detected",
            Self::RateLimited { .. } => "security.rate_limited",
            Self::SessionLoaded { .. } => "session.loaded",
            Self::SessionCleared { .. } => "session.cleared",
            Self::SessionExpiring { .. } => "session.expiring",
            Self::SessionInvalid { .. } => "session.invalid",
            Self::SessionExtended { .. } => "session.extended",
            Self::LoggedOut { .. } => "session.logged_out",
            Self::IdleWarning { .. } => "activity.idle_warning",
            Self::IdleTimeout { .. } => "activity.idle_timeout",
        }
    }

    /// Returns the timestamp when this event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ThreatDetected { at, .. }
            | Self::RateLimited { at, .. }
            | Self::SessionLoaded { at, .. }
            | Self::SessionCleared { at }
            | Self::SessionExpiring { at, .. }
            | Self::SessionInvalid { at, .. }
            | Self::SessionExtended { at }
            | Self::LoggedOut { at, .. }
            | Self::IdleWarning { at }
            | Self::IdleTimeout { at } => *at,
        }
    }
}
