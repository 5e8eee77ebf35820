//! Error taxonomy and HTTP status classification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Coarse classification of an HTTP failure status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpErrorKind {
    Authentication,
    AccessDenied,
    NotFound,
    InvalidRequest,
    RequestTimeout,
    RateLimit,
    Server,
    Other,
}

/// HTTP status classification result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpErrorClassification {
    pub kind: HttpErrorKind,
    pub retryable: bool,
}

impl HttpErrorClassification {
    const fn new(kind: HttpErrorKind, retryable: bool) -> Self {
        Self { kind, retryable }
    }
}

/// Map HTTP status codes to error classification.
pub fn map_http_status(status: u16) -> Option<HttpErrorClassification> {
    let classification = match status {
        400 | 422 => HttpErrorClassification::new(HttpErrorKind::InvalidRequest, false),
        401 => HttpErrorClassification::new(HttpErrorKind::Authentication, false),
        403 => HttpErrorClassification::new(HttpErrorKind::AccessDenied, false),
        404 => HttpErrorClassification::new(HttpErrorKind::NotFound, false),
        408 => HttpErrorClassification::new(HttpErrorKind::RequestTimeout, true),
        429 => HttpErrorClassification::new(HttpErrorKind::RateLimit, true),
        500 | 502 | 503 | 504 => HttpErrorClassification::new(HttpErrorKind::Server, true),
        _ => return None,
    };
    Some(classification)
}

/// Classify a status, falling back to `Other` for unmapped codes.
pub fn classify_status(status: u16) -> HttpErrorClassification {
    map_http_status(status).unwrap_or(HttpErrorClassification::new(
        HttpErrorKind::Other,
        status >= 500,
    ))
}

/// Credential acquisition and renewal failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no refresh token available")]
    RefreshUnavailable,
    #[error("credential refresh rejected with status {0}")]
    RefreshRejected(u16),
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
    #[error("credential rejected after refresh")]
    Rejected,
    #[error("invalid credential header: {0}")]
    InvalidHeader(String),
}

/// Transport error discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Connection,
    Reading,
    Auth,
    Status,
    Cancelled,
    Configuration,
}

/// Failure of one streamed query.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TransportError {
    /// The request could not be established or sent.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The response body broke off mid-stream.
    #[error("stream read failed: {0}")]
    Reading(String),
    /// Credential refresh failed, or the refreshed credential was rejected too.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("request failed with status {status}")]
    Status {
        status: u16,
        kind: HttpErrorKind,
        body: String,
    },
    #[error("stream cancelled")]
    Cancelled,
    #[error("invalid transport configuration: {0}")]
    Configuration(String),
}

impl TransportError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            kind: classify_status(status).kind,
            body: body.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Connection(_) => TransportErrorKind::Connection,
            TransportError::Reading(_) => TransportErrorKind::Reading,
            TransportError::Auth(_) => TransportErrorKind::Auth,
            TransportError::Status { .. } => TransportErrorKind::Status,
            TransportError::Cancelled => TransportErrorKind::Cancelled,
            TransportError::Configuration(_) => TransportErrorKind::Configuration,
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            TransportError::Connection(_) | TransportError::Reading(_) => true,
            TransportError::Status { status, .. } => classify_status(*status).retryable,
            TransportError::Auth(_)
            | TransportError::Cancelled
            | TransportError::Configuration(_) => false,
        }
    }

    /// The single line shown to the person asking when a turn fails.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Connection(_) => {
                "Could not reach the chat service. Check your connection and try again."
                    .to_string()
            }
            TransportError::Reading(_) => {
                "The answer was interrupted before it finished. Please ask again.".to_string()
            }
            TransportError::Auth(_) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            TransportError::Status { status, kind, .. } => match kind {
                HttpErrorKind::AccessDenied => {
                    "You do not have access to this audit session.".to_string()
                }
                HttpErrorKind::RateLimit => {
                    "Too many requests. Please wait a moment and try again.".to_string()
                }
                HttpErrorKind::Server => {
                    format!("The chat service failed to answer (status {status}).")
                }
                _ => format!("The chat request was rejected (status {status})."),
            },
            TransportError::Cancelled => "The answer was cancelled.".to_string(),
            TransportError::Configuration(message) => {
                format!("The chat client is misconfigured: {message}")
            }
        }
    }
}

/// Failures of the REST collaborators (session, history, documents).
#[derive(Clone, Debug, PartialEq, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request failed with status {status}: {message}")]
    Status {
        status: u16,
        kind: HttpErrorKind,
        message: String,
    },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("invalid backend configuration: {0}")]
    Configuration(String),
}

impl From<ConfigError> for BackendError {
    fn from(error: ConfigError) -> Self {
        BackendError::Configuration(error.to_string())
    }
}

impl BackendError {
    pub fn from_status(status: u16, url: &str, body: String) -> Self {
        let classification = classify_status(status);
        if classification.kind == HttpErrorKind::NotFound {
            return BackendError::NotFound(url.to_string());
        }
        BackendError::Status {
            status,
            kind: classification.kind,
            message: body,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

/// Orchestrator-level failures surfaced to callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session context could not be loaded; the conversation cannot proceed.
    #[error("failed to load audit session {session_id}: {source}")]
    Initialization {
        session_id: String,
        #[source]
        source: BackendError,
    },
    #[error("no active session; initialize the conversation first")]
    NoActiveSession,
    #[error("an answer is already streaming for this conversation")]
    TurnInProgress,
    #[error(transparent)]
    Transport(#[from] TransportError),
}
