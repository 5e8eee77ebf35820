//! REST collaborators the orchestrator reads session context from.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::auth::{CredentialProvider, send_with_refresh};
use crate::config::ClientConfig;
use crate::errors::{BackendError, TransportError};
use crate::types::{AuditSession, Document, Exchange};

/// Session context, history and documents for one audit session.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn audit_session(&self, session_id: &str) -> Result<AuditSession, BackendError>;

    /// Prior exchanges of a conversation. `BackendError::NotFound` means the
    /// conversation has no history yet.
    async fn chat_history(&self, conversation_id: &str) -> Result<Vec<Exchange>, BackendError>;

    async fn session_documents(&self, session_id: &str) -> Result<Vec<Document>, BackendError>;
}

/// `SessionBackend` over the audit REST API.
pub struct HttpSessionBackend {
    client: reqwest::Client,
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for HttpSessionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSessionBackend")
            .field("base_url", &self.config.base_url.as_str())
            .finish()
    }
}

impl HttpSessionBackend {
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout.connect)
            .build()
            .map_err(|error| BackendError::Configuration(error.to_string()))?;
        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, BackendError> {
        let response = send_with_refresh(self.credentials.as_ref(), |headers| {
            self.client.get(&url).headers(headers)
        })
        .await
        .map_err(|error| match error {
            TransportError::Auth(auth) => BackendError::Auth(auth),
            other => BackendError::Connection(other.to_string()),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), %url, "backend request failed");
            return Err(BackendError::from_status(status.as_u16(), &url, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|error| BackendError::Decode(error.to_string()))
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn audit_session(&self, session_id: &str) -> Result<AuditSession, BackendError> {
        let mut session: AuditSession = self
            .get_json(self.config.audit_session_url(session_id)?)
            .await?;
        if session.id.is_empty() {
            session.id = session_id.to_string();
        }
        Ok(session)
    }

    async fn chat_history(&self, conversation_id: &str) -> Result<Vec<Exchange>, BackendError> {
        self.get_json(self.config.chat_history_url(conversation_id)?)
            .await
    }

    async fn session_documents(&self, session_id: &str) -> Result<Vec<Document>, BackendError> {
        self.get_json(self.config.session_documents_url(session_id)?)
            .await
    }
}
