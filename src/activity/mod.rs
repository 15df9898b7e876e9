//! Inactivity tracking.
//!
//! [`ActivityMonitor`] moves through `Active -> Warning -> Idle` as time
//! passes without user activity. Any activity signal before `Idle` returns it
//! to `Active`. `Idle` is terminal until the monitor is restarted.

mod monitor;
mod source;

use std::time::Duration;

pub use monitor::ActivityMonitor;
use serde::Serialize;
pub use source::{ActivityChannel, ActivitySignal, ActivitySource};
use tokio::time::Instant;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_WARNING_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityPhase {
    Active,
    /// Within `warning_window` of the idle deadline.
    Warning,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityState {
    pub last_activity_at: Instant,
    pub phase: ActivityPhase,
}

impl ActivityState {
    pub(crate) fn active_at(at: Instant) -> Self {
        Self {
            last_activity_at: at,
            phase: ActivityPhase::Active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityConfig {
    /// Inactivity after which the monitor goes idle.
    pub idle_timeout: Duration,
    /// How long before `idle_timeout` the warning phase starts.
    pub warning_window: Duration,
    /// Upper bound between two checks of the driver.
    pub check_interval: Duration,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            warning_window: DEFAULT_WARNING_WINDOW,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

impl ActivityConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.idle_timeout.is_zero() {
            return Err("idle_timeout must be positive");
        }
        if self.warning_window >= self.idle_timeout {
            return Err("warning_window must be shorter than idle_timeout");
        }
        if self.check_interval.is_zero() {
            return Err("check_interval must be positive");
        }
        Ok(())
    }

    /// Inactivity after which the warning phase starts.
    pub fn warning_after(&self) -> Duration {
        self.idle_timeout.saturating_sub(self.warning_window)
    }
}
