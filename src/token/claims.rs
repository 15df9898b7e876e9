use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::session::Identity;

/// Claims that never become identity fields.
pub const RESERVED_CLAIMS: [&str; 4] = ["exp", "iat", "iss", "aud"];

/// Role assigned when the token carries none.
pub const DEFAULT_ROLE: &str = "user";

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    /// Account email.
    pub email: String,
    /// Expiration time (Unix timestamp, seconds).
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// `id` claim, stringified when numeric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issued at (Unix timestamp, seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Every other claim, including `iss` and `aud`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn claim_as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Claims {
    /// Splits a payload object into typed claims.
    ///
    /// Returns `None` when `email` is not a string or `exp` is not an integer.
    pub(crate) fn from_payload(mut payload: Map<String, Value>) -> Option<Self> {
        let email = match payload.remove("email") {
            Some(Value::String(email)) => email,
            _ => return None,
        };
        let exp = payload.remove("exp").and_then(|v| v.as_i64())?;

        let role = payload.remove("role").and_then(claim_as_string);
        let id = payload.remove("id").and_then(claim_as_string);
        let sub = payload.remove("sub").and_then(claim_as_string);
        let name = payload.remove("name").and_then(claim_as_string);
        let iat = payload.remove("iat").and_then(|v| v.as_i64());

        Some(Self {
            email,
            exp,
            role,
            id,
            sub,
            name,
            iat,
            extra: payload,
        })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| Utc.timestamp_opt(iat, 0).single())
    }

    /// `id` if present, otherwise `sub`.
    pub fn user_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.sub.as_deref())
    }

    /// Builds the session identity, dropping [`RESERVED_CLAIMS`].
    pub fn into_identity(self) -> Identity {
        let id = self.id.or(self.sub);
        let mut extra = self.extra;
        for reserved in RESERVED_CLAIMS {
            extra.remove(reserved);
        }

        Identity {
            email: self.email,
            role: self.role.unwrap_or_else(|| DEFAULT_ROLE.to_owned()),
            id,
            name: self.name,
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_from_payload_requires_email_and_exp() {
        assert!(Claims::from_payload(payload(json!({"exp": 1}))).is_none());
        assert!(Claims::from_payload(payload(json!({"email": "a@b.co"}))).is_none());
        assert!(Claims::from_payload(payload(json!({"email": 5, "exp": 1}))).is_none());
        assert!(Claims::from_payload(payload(json!({"email": "a@b.co", "exp": "soon"}))).is_none());
        assert!(Claims::from_payload(payload(json!({"email": "a@b.co", "exp": 1}))).is_some());
    }

    #[test]
    fn test_numeric_id_is_stringified() {
        let claims =
            Claims::from_payload(payload(json!({"email": "a@b.co", "exp": 1, "id": 42}))).unwrap();
        assert_eq!(claims.id.as_deref(), Some("42"));
        assert_eq!(claims.user_id(), Some("42"));
    }

    #[test]
    fn test_into_identity_drops_reserved_claims() {
        let claims = Claims::from_payload(payload(json!({
            "email": "alice@example.com",
            "exp": 2_000_000_000,
            "iat": 1_000_000_000,
            "iss": "auth.example.com",
            "aud": "web",
            "sub": "u-1",
            "tenant": "acme"
        })))
        .unwrap();

        let identity = claims.into_identity();
        assert_eq!(identity.email, "alice@example.com");
        assert_eq!(identity.role, "user");
        assert_eq!(identity.id.as_deref(), Some("u-1"));
        assert_eq!(identity.extra.get("tenant"), Some(&json!("acme")));
        for reserved in RESERVED_CLAIMS {
            assert!(!identity.extra.contains_key(reserved));
        }
    }

    #[test]
    fn test_expires_at() {
        let claims =
            Claims::from_payload(payload(json!({"email": "a@b.co", "exp": 1_700_000_000})))
                .unwrap();
        assert_eq!(claims.expires_at().unwrap().timestamp(), 1_700_000_000);
    }
}
