//! Client-side session state.
//!
//! [`SessionStore`] owns the current [`Session`], persists the bearer token
//! and an identity cache through a [`SessionStorage`](crate::storage::SessionStorage),
//! and keeps several instances sharing that storage consistent.

mod config;
mod store;

use chrono::{DateTime, TimeZone, Utc};
pub use config::{
    DEFAULT_AUX_PREFIXES, DEFAULT_CACHE_KEY, DEFAULT_CACHE_STALENESS, DEFAULT_TOKEN_KEY,
    SessionStoreConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
pub use store::SessionStore;

use crate::crypto::constant_time_eq;
use crate::token::DEFAULT_ROLE;

fn default_role() -> String {
    DEFAULT_ROLE.to_owned()
}

/// Who the session belongs to, derived from token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Non-reserved claims without a dedicated field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role: default_role(),
            id: None,
            name: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

/// The authenticated session held by a [`SessionStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Identity,
    /// 64 hex characters, random per session.
    pub session_id: String,
    pub last_synced_at: DateTime<Utc>,
    /// Token expiry, when the session came from a token.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Persisted identity cache.
///
/// Serialized as the identity fields plus `lastSync` (epoch milliseconds)
/// and `sessionId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(rename = "lastSync")]
    pub last_sync: i64,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

impl CacheEntry {
    pub fn for_session(session: &Session) -> Self {
        Self {
            identity: session.identity.clone(),
            last_sync: session.last_synced_at.timestamp_millis(),
            session_id: session.session_id.clone(),
        }
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_sync).single()
    }

    /// Whether this entry may stand in for re-deriving the identity.
    pub fn is_reusable(
        &self,
        session_id: &str,
        email: &str,
        staleness: std::time::Duration,
        now: DateTime<Utc>,
    ) -> bool {
        if !constant_time_eq(self.session_id.as_bytes(), session_id.as_bytes())
            || self.identity.email != email
        {
            return false;
        }
        let Ok(staleness) = chrono::Duration::from_std(staleness) else {
            return false;
        };
        self.last_synced_at()
            .is_some_and(|synced| synced <= now && now - synced < staleness)
    }
}
