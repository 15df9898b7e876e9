//! Client-side request throttling.
//!
//! [`SlidingWindowLimiter`] keeps per-identifier request timestamps inside a
//! trailing window. [`RateLimiter`] groups independently configured
//! limiters under names such as `"search"` or `"favorites"`.

mod limit;
mod limiter;
mod window;

pub use limit::{DEFAULT_MESSAGE, Limit};
pub use limiter::RateLimiter;
pub use window::{DEFAULT_MAX_TRACKED_KEYS, RateLimitResult, SlidingWindowLimiter};

/// Limiter names registered by the controller.
pub const GENERIC: &str = "generic";
pub const SEARCH: &str = "search";
pub const FAVORITES: &str = "favorites";
