use std::time::Duration;

pub const DEFAULT_MESSAGE: &str = "Too many requests. Please try again later.";

/// Request budget per identifier over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    pub(crate) max_requests: u32,
    pub(crate) window: Duration,
    pub(crate) message: Option<String>,
}

impl Limit {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            message: None,
        }
    }

    #[must_use]
    pub fn per_second(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    #[must_use]
    pub fn per_hour(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60 * 60))
    }

    /// 50 requests per minute.
    #[must_use]
    pub fn generic() -> Self {
        Self::per_minute(50)
    }

    /// 30 searches per minute.
    #[must_use]
    pub fn search() -> Self {
        Self::per_minute(30).message("Too many searches. Please slow down.")
    }

    /// 20 favorite toggles per minute.
    #[must_use]
    pub fn favorites() -> Self {
        Self::per_minute(20)
    }

    #[must_use]
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn get_message(&self) -> &str {
        self.message.as_deref().unwrap_or(DEFAULT_MESSAGE)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_requests == 0 {
            return Err("max_requests must be positive");
        }
        if self.window.is_zero() {
            return Err("window must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_minute() {
        let limit = Limit::per_minute(60);
        assert_eq!(limit.max_requests(), 60);
        assert_eq!(limit.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_limit_per_hour() {
        let limit = Limit::per_hour(1000);
        assert_eq!(limit.window(), Duration::from_secs(3600));
    }

    #[test]
    fn test_presets() {
        assert_eq!(Limit::generic().max_requests(), 50);
        assert_eq!(Limit::search().max_requests(), 30);
        assert_eq!(Limit::favorites().max_requests(), 20);
        assert_eq!(Limit::favorites().window(), Duration::from_secs(60));
    }

    #[test]
    fn test_limit_message() {
        assert_eq!(Limit::generic().get_message(), DEFAULT_MESSAGE);

        let limit = Limit::per_minute(5).message("Too many login attempts");
        assert_eq!(limit.get_message(), "Too many login attempts");
    }

    #[test]
    fn test_validate() {
        assert!(Limit::generic().validate().is_ok());
        assert!(Limit::per_minute(0).validate().is_err());
        assert!(Limit::new(5, Duration::ZERO).validate().is_err());
    }
}
