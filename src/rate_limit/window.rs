use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::limit::Limit;

/// Identifiers tracked before a full sweep of empty windows runs.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 10_000;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed. Contains remaining requests in the window.
    Allowed { remaining: u32 },
    /// Request is rate limited.
    Limited { retry_after: Duration, message: String },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }

    /// Time until the oldest request leaves the window, if limited.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Limited { retry_after, .. } => Some(*retry_after),
            Self::Allowed { .. } => None,
        }
    }
}

/// Sliding-window limiter over per-identifier request timestamps.
///
/// Each identifier keeps the instants of its requests inside the trailing
/// window. A request is allowed while fewer than `max_requests` remain in
/// the window; denied requests are not recorded.
///
/// # Example
///
/// ```rust
/// use warden::rate_limit::{Limit, SlidingWindowLimiter};
///
/// let limiter = SlidingWindowLimiter::new(Limit::per_minute(2));
/// assert!(limiter.allow("alice"));
/// assert!(limiter.allow("alice"));
/// assert!(!limiter.allow("alice"));
/// assert!(limiter.allow("bob"));
/// ```
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: Limit,
    max_tracked_keys: usize,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

fn prune(window: &mut VecDeque<Instant>, span: Duration, now: Instant) {
    while window
        .front()
        .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= span)
    {
        window.pop_front();
    }
}

impl SlidingWindowLimiter {
    pub fn new(limit: Limit) -> Self {
        Self {
            limit,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_max_tracked_keys(mut self, max: usize) -> Self {
        self.max_tracked_keys = max;
        self
    }

    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a request for `identifier` if the budget allows it.
    pub fn allow(&self, identifier: &str) -> bool {
        self.hit(identifier).is_allowed()
    }

    /// Like [`allow`](Self::allow), with remaining budget or retry delay.
    pub fn hit(&self, identifier: &str) -> RateLimitResult {
        let now = Instant::now();
        let span = self.limit.window;
        let max = usize::try_from(self.limit.max_requests).unwrap_or(usize::MAX);
        let mut windows = self.windows();

        if !windows.contains_key(identifier) && windows.len() >= self.max_tracked_keys {
            Self::sweep(&mut windows, span, now);
        }

        let window = windows.entry(identifier.to_owned()).or_default();
        prune(window, span, now);

        if window.len() >= max {
            let retry_after = window
                .front()
                .map_or(Duration::ZERO, |oldest| (*oldest + span).saturating_duration_since(now));
            log::debug!(
                target: "warden::rate_limit",
                "msg=\"rate limited\", identifier=\"{identifier}\", retry_after_ms={}",
                retry_after.as_millis()
            );
            return RateLimitResult::Limited {
                retry_after,
                message: self.limit.get_message().to_owned(),
            };
        }

        window.push_back(now);
        let remaining = max - window.len();
        RateLimitResult::Allowed {
            remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        }
    }

    /// Requests still allowed for `identifier` in the current window.
    pub fn remaining(&self, identifier: &str) -> u32 {
        let now = Instant::now();
        let mut windows = self.windows();

        let used = match windows.get_mut(identifier) {
            Some(window) => {
                prune(window, self.limit.window, now);
                window.len()
            }
            None => 0,
        };
        if used == 0 {
            windows.remove(identifier);
        }

        self.limit
            .max_requests
            .saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// Forgets all requests of `identifier`.
    pub fn reset(&self, identifier: &str) {
        self.windows().remove(identifier);
    }

    /// Drops every identifier whose window has emptied. Returns how many.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows();
        Self::sweep(&mut windows, self.limit.window, now)
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows().len()
    }

    fn sweep(
        windows: &mut HashMap<String, VecDeque<Instant>>,
        span: Duration,
        now: Instant,
    ) -> usize {
        let before = windows.len();
        windows.retain(|_, window| {
            prune(window, span, now);
            !window.is_empty()
        });
        before - windows.len()
    }
}
