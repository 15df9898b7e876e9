use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Claims, TokenError};

/// Default window before `exp` in which a token is already refused.
pub const DEFAULT_EXPIRATION_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Structural and temporal validation of bearer tokens.
///
/// The signature segment is not verified: the server that issued the token
/// checks it on every request. This validator only decides whether the
/// client should consider itself logged in.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    expiration_buffer: Duration,
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self {
            expiration_buffer: DEFAULT_EXPIRATION_BUFFER,
        }
    }
}

impl TokenValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_expiration_buffer(mut self, buffer: Duration) -> Self {
        self.expiration_buffer = buffer;
        self
    }

    pub fn expiration_buffer(&self) -> Duration {
        self.expiration_buffer
    }

    /// Validates against the current time.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let segments: Vec<&str> = token.split('.').collect();
        let [_header, payload, _signature] = segments.as_slice() else {
            return Err(TokenError::MalformedStructure);
        };
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(TokenError::MalformedStructure);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| TokenError::MalformedPayload)?;
        let payload = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            _ => return Err(TokenError::MalformedPayload),
        };

        let claims = Claims::from_payload(payload).ok_or(TokenError::MissingClaims)?;

        let now_secs = now.timestamp();
        let buffer_secs = i64::try_from(self.expiration_buffer.as_secs()).unwrap_or(i64::MAX);

        if claims.exp <= now_secs {
            return Err(TokenError::Expired);
        }
        if claims.exp <= now_secs.saturating_add(buffer_secs) {
            return Err(TokenError::ExpiringSoon);
        }

        Ok(claims)
    }
}
