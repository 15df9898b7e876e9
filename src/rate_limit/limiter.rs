use std::collections::HashMap;
use std::sync::Arc;

use super::limit::Limit;
use super::window::{RateLimitResult, SlidingWindowLimiter};
use crate::SecurityError;

/// Named sliding-window limiters.
///
/// Every name owns an independent [`SlidingWindowLimiter`]. Clones share
/// the limiters.
///
/// # Example
///
/// ```rust
/// use warden::rate_limit::{Limit, RateLimiter};
///
/// let limiter = RateLimiter::new()
///     .for_("search", Limit::search())
///     .for_("login", Limit::per_minute(5).message("Too many login attempts"));
///
/// assert!(limiter.hit("search", "alice").unwrap().is_allowed());
/// ```
#[derive(Clone, Default)]
pub struct RateLimiter {
    limiters: HashMap<String, Arc<SlidingWindowLimiter>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named rate limit, replacing any limiter with that name.
    #[must_use]
    pub fn for_(mut self, name: impl Into<String>, limit: Limit) -> Self {
        self.limiters
            .insert(name.into(), Arc::new(SlidingWindowLimiter::new(limit)));
        self
    }

    /// Registers an already built limiter.
    #[must_use]
    pub fn with_limiter(mut self, name: impl Into<String>, limiter: SlidingWindowLimiter) -> Self {
        self.limiters.insert(name.into(), Arc::new(limiter));
        self
    }

    pub fn limiter(&self, name: &str) -> Option<&Arc<SlidingWindowLimiter>> {
        self.limiters.get(name)
    }

    pub fn get_limit(&self, name: &str) -> Option<&Limit> {
        self.limiters.get(name).map(|limiter| limiter.limit())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.limiters.keys().map(String::as_str)
    }

    fn require(&self, name: &str) -> Result<&SlidingWindowLimiter, SecurityError> {
        self.limiters
            .get(name)
            .map(|limiter| limiter.as_ref())
            .ok_or_else(|| {
                SecurityError::Configuration(format!("Rate limit '{name}' not configured"))
            })
    }

    /// Records a request against a named limit.
    pub fn hit(&self, name: &str, identifier: &str) -> Result<RateLimitResult, SecurityError> {
        Ok(self.require(name)?.hit(identifier))
    }

    /// Runs `action` only if the named limit allows the request.
    pub async fn attempt<T, F, Fut>(
        &self,
        name: &str,
        identifier: &str,
        action: F,
    ) -> Result<Result<T, RateLimitResult>, SecurityError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        match self.hit(name, identifier)? {
            RateLimitResult::Allowed { .. } => Ok(Ok(action().await)),
            limited @ RateLimitResult::Limited { .. } => Ok(Err(limited)),
        }
    }

    pub fn remaining(&self, name: &str, identifier: &str) -> Result<u32, SecurityError> {
        Ok(self.require(name)?.remaining(identifier))
    }

    pub fn clear(&self, name: &str, identifier: &str) -> Result<(), SecurityError> {
        self.require(name)?.reset(identifier);
        Ok(())
    }

    /// Sweeps empty windows in every limiter. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        self.limiters.values().map(|limiter| limiter.cleanup_expired()).sum()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limits", &self.limiters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
