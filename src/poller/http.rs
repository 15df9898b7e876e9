use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{SessionBackend, SessionStatus};
use crate::SecurityError;
use crate::session::SessionStore;
use crate::storage::SessionStorage;

#[derive(Debug, Deserialize)]
struct CheckResponse {
    /// Milliseconds.
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

/// Session backend over HTTP.
///
/// Both requests carry the stored token as a bearer credential. Any
/// non-success status means the session is no longer valid.
///
/// - check: `GET <check_url>` answering `{"expiresIn": <ms>}`
/// - extend: `POST <extend_url>`
pub struct HttpSessionBackend {
    client: Client,
    check_url: String,
    extend_url: String,
    storage: Arc<dyn SessionStorage>,
    token_key: String,
}

impl HttpSessionBackend {
    pub fn new(
        check_url: impl Into<String>,
        extend_url: impl Into<String>,
        store: &SessionStore,
    ) -> Self {
        Self {
            client: Client::new(),
            check_url: check_url.into(),
            extend_url: extend_url.into(),
            storage: Arc::clone(store.storage()),
            token_key: store.config().token_key.clone(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn bearer(&self) -> Result<String, SecurityError> {
        self.storage
            .get(&self.token_key)
            .await?
            .ok_or_else(|| SecurityError::Backend("no token stored".to_owned()))
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn check_session(&self) -> Result<SessionStatus, SecurityError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(&self.check_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SecurityError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecurityError::Backend(format!("session check returned {status}")));
        }

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| SecurityError::Backend(e.to_string()))?;

        Ok(SessionStatus {
            expires_in: Duration::from_millis(body.expires_in),
        })
    }

    async fn extend_session(&self) -> Result<(), SecurityError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .post(&self.extend_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SecurityError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecurityError::Backend(format!("session extend returned {status}")));
        }
        Ok(())
    }
}
