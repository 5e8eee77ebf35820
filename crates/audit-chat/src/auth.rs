//! Credential providers: bearer headers plus refresh-on-expiry.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::ClientConfig;
use crate::errors::{AuthError, TransportError};

/// Supplies auth headers and renews the credential when the server rejects it.
///
/// Implementations own the stored credential; callers only go through these
/// two operations.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn auth_headers(&self) -> Result<HeaderMap, AuthError>;

    /// Mint a fresh access credential from the stored refresh token.
    async fn refresh(&self) -> Result<(), AuthError>;
}

/// Access and refresh token pair.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

pub fn bearer_headers(access_token: Option<&str>) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = access_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|error| AuthError::InvalidHeader(error.to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Fixed bearer token with no way to renew it.
#[derive(Clone, Debug)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                access_token: Some(access_token.into()),
                refresh_token: None,
            },
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn auth_headers(&self) -> Result<HeaderMap, AuthError> {
        bearer_headers(self.credentials.access_token.as_deref())
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        Err(AuthError::RefreshUnavailable)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Credential provider that renews tokens against the auth refresh endpoint.
pub struct HttpCredentialProvider {
    client: reqwest::Client,
    refresh_url: String,
    credentials: RwLock<Credentials>,
}

impl std::fmt::Debug for HttpCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCredentialProvider")
            .field("refresh_url", &self.refresh_url)
            .finish()
    }
}

impl HttpCredentialProvider {
    pub fn new(refresh_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            refresh_url: refresh_url.into(),
            credentials: RwLock::new(credentials),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.refresh_url(),
            Credentials {
                access_token: config.access_token.clone(),
                refresh_token: config.refresh_token.clone(),
            },
        )
    }

    pub async fn credentials(&self) -> Credentials {
        self.credentials.read().await.clone()
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn auth_headers(&self) -> Result<HeaderMap, AuthError> {
        let credentials = self.credentials.read().await;
        bearer_headers(credentials.access_token.as_deref())
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        let refresh_token = self
            .credentials
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or(AuthError::RefreshUnavailable)?;

        let response = self
            .client
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|error| AuthError::RefreshFailed(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(status, "credential refresh rejected");
            return Err(AuthError::RefreshRejected(status));
        }

        let renewed = response
            .json::<RefreshResponse>()
            .await
            .map_err(|error| AuthError::RefreshFailed(error.to_string()))?;

        let mut credentials = self.credentials.write().await;
        credentials.access_token = Some(renewed.access_token);
        if let Some(token) = renewed.refresh_token {
            credentials.refresh_token = Some(token);
        }
        tracing::info!("access credential refreshed");
        Ok(())
    }
}

/// Send a request with current credentials, renewing them once on a 401.
///
/// The request is issued at most twice. A refresh failure, or a second 401
/// after a successful refresh, ends in `TransportError::Auth`.
pub async fn send_with_refresh<F>(
    credentials: &dyn CredentialProvider,
    build: F,
) -> Result<reqwest::Response, TransportError>
where
    F: Fn(HeaderMap) -> reqwest::RequestBuilder,
{
    let mut refreshed = false;
    loop {
        let headers = credentials.auth_headers().await?;
        let response = build(headers)
            .send()
            .await
            .map_err(|error| TransportError::Connection(error.to_string()))?;

        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if refreshed {
            tracing::warn!("refreshed credential rejected");
            return Err(AuthError::Rejected.into());
        }
        tracing::info!("access credential expired; refreshing before retry");
        credentials.refresh().await?;
        refreshed = true;
    }
}
