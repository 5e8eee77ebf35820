//! Core data model types (exchanges, session context, documents, requests).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Free-form completion annotations.
pub type ExchangeMetadata = BTreeMap<String, Value>;

/// Who produced an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Whether an exchange is still being written by a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    /// Assistant answer still receiving frames.
    Pending,
    #[default]
    Complete,
}

/// Identity and domain scope shared by every exchange of one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub audit_session_id: String,
    pub compliance_domain: String,
}

/// One utterance in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: String,
    pub role: Role,
    #[serde(alias = "content", alias = "message", deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(alias = "created_at")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversation_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub audit_session_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub compliance_domain: String,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExchangeMetadata>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ExchangeStatus,
}

impl Exchange {
    fn new(id: impl Into<String>, role: Role, text: String, context: &ConversationContext) -> Self {
        Self {
            id: id.into(),
            role,
            text,
            timestamp: Utc::now(),
            sources: Vec::new(),
            conversation_id: context.conversation_id.clone(),
            audit_session_id: context.audit_session_id.clone(),
            compliance_domain: context.compliance_domain.clone(),
            response_time_ms: None,
            metadata: None,
            status: ExchangeStatus::Complete,
        }
    }

    /// A user question; its text is frozen from creation.
    pub fn user(
        id: impl Into<String>,
        text: impl Into<String>,
        context: &ConversationContext,
    ) -> Self {
        Self::new(id, Role::User, text.into(), context)
    }

    /// An empty assistant answer waiting for stream frames.
    pub fn assistant_placeholder(id: impl Into<String>, context: &ConversationContext) -> Self {
        let mut exchange = Self::new(id, Role::Assistant, String::new(), context);
        exchange.status = ExchangeStatus::Pending;
        exchange
    }

    pub fn is_in_flight(&self) -> bool {
        self.role == Role::Assistant && self.status == ExchangeStatus::Pending
    }
}

/// Partial update applied by [`crate::Conversation::mutate`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangePatch {
    pub text: Option<String>,
    pub sources: Option<Vec<String>>,
    pub response_time_ms: Option<u64>,
    pub metadata: Option<ExchangeMetadata>,
    pub status: Option<ExchangeStatus>,
}

impl ExchangePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Terminal metadata for a successfully streamed answer. Freezes the text.
    pub fn completion(
        sources: Vec<String>,
        response_time_ms: u64,
        metadata: ExchangeMetadata,
    ) -> Self {
        Self {
            text: None,
            sources: Some(sources),
            response_time_ms: Some(response_time_ms),
            metadata: Some(metadata),
            status: Some(ExchangeStatus::Complete),
        }
    }
}

/// Audit session context the conversation is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSession {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    pub compliance_domain: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub session_name: String,
}

/// A document loaded for an audit session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(alias = "file_name", alias = "title")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_version: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub document_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// JSON payload posted to the streaming query endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_domain: Option<String>,
    pub match_threshold: f64,
    pub match_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_versions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_tags: Option<Vec<String>>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, match_threshold: f64, match_count: u32) -> Self {
        Self {
            question: question.into(),
            conversation_id: None,
            audit_session_id: None,
            compliance_domain: None,
            match_threshold,
            match_count,
            document_versions: None,
            document_tags: None,
        }
    }

    pub fn with_context(mut self, context: &ConversationContext) -> Self {
        self.conversation_id = non_empty(&context.conversation_id);
        self.audit_session_id = non_empty(&context.audit_session_id);
        self.compliance_domain = non_empty(&context.compliance_domain);
        self
    }
}

/// Backends send `null` where a field has no value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response times arrive as integer or fractional milliseconds.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<f64>::deserialize(deserializer)?;
    Ok(millis
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value.round() as u64))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
