use std::time::Duration;

use crate::token::DEFAULT_EXPIRATION_BUFFER;

pub const DEFAULT_TOKEN_KEY: &str = "auth_token";
pub const DEFAULT_CACHE_KEY: &str = "user_data";
pub const DEFAULT_AUX_PREFIXES: [&str; 2] = ["auth_", "user_"];
pub const DEFAULT_CACHE_STALENESS: Duration = Duration::from_secs(5 * 60);

/// Where and how a [`SessionStore`](super::SessionStore) persists its state.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Storage key of the bearer token.
    pub token_key: String,
    /// Storage key of the identity cache.
    pub cache_key: String,
    /// Keys starting with any of these are removed on logout.
    pub aux_prefixes: Vec<String>,
    /// Maximum age of a reusable identity cache.
    pub cache_staleness: Duration,
    /// Tokens expiring within this window are refused.
    pub expiration_buffer: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            token_key: DEFAULT_TOKEN_KEY.to_owned(),
            cache_key: DEFAULT_CACHE_KEY.to_owned(),
            aux_prefixes: DEFAULT_AUX_PREFIXES.iter().map(|p| (*p).to_owned()).collect(),
            cache_staleness: DEFAULT_CACHE_STALENESS,
            expiration_buffer: DEFAULT_EXPIRATION_BUFFER,
        }
    }
}

impl SessionStoreConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.token_key.is_empty() || self.cache_key.is_empty() {
            return Err("storage keys must not be empty");
        }
        if self.token_key == self.cache_key {
            return Err("token_key and cache_key must differ");
        }
        if self.aux_prefixes.iter().any(String::is_empty) {
            return Err("an empty aux prefix would clear the whole storage");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionStoreConfig::default();
        assert_eq!(config.token_key, "auth_token");
        assert_eq!(config.cache_key, "user_data");
        assert_eq!(config.aux_prefixes, vec!["auth_", "user_"]);
        assert_eq!(config.cache_staleness, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_shared_key() {
        let config = SessionStoreConfig {
            cache_key: "auth_token".to_owned(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let config = SessionStoreConfig {
            aux_prefixes: vec![String::new()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
