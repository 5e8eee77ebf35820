//! Streamed query transport.
//!
//! One call to [`StreamTransport::open_stream`] posts a [`QueryRequest`] and
//! yields the answer as a sequence of [`StreamEvent`]s: zero or more
//! `Frame`s followed by exactly one terminal `Complete` or `Failed`.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;

use crate::abort::{AbortController, AbortSignal};
use crate::auth::{CredentialProvider, send_with_refresh};
use crate::config::ClientConfig;
use crate::errors::TransportError;
use crate::types::{ExchangeMetadata, QueryRequest};
use crate::utils::FrameDecoder;

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";
pub const AUDIT_SESSION_ID_HEADER: &str = "x-audit-session-id";
pub const COMPLIANCE_DOMAIN_HEADER: &str = "x-compliance-domain";

/// Terminal result of a successful stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamCompletion {
    /// Every frame concatenated in arrival order.
    pub full_text: String,
    pub conversation_id: String,
    pub audit_session_id: String,
    pub compliance_domain: String,
}

impl StreamCompletion {
    pub fn from_headers(full_text: String, headers: &HeaderMap) -> Self {
        Self {
            full_text,
            conversation_id: header_or_empty(headers, CONVERSATION_ID_HEADER),
            audit_session_id: header_or_empty(headers, AUDIT_SESSION_ID_HEADER),
            compliance_domain: header_or_empty(headers, COMPLIANCE_DOMAIN_HEADER),
        }
    }

    /// Non-empty response header values keyed by field name.
    pub fn metadata(&self) -> ExchangeMetadata {
        [
            ("conversation_id", &self.conversation_id),
            ("audit_session_id", &self.audit_session_id),
            ("compliance_domain", &self.compliance_domain),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| {
            (key.to_string(), serde_json::Value::String(value.clone()))
        })
        .collect()
    }
}

fn header_or_empty(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// One step of a streamed answer.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Frame(String),
    Complete(StreamCompletion),
    Failed(TransportError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Frame(_))
    }
}

/// Stream of events for one open query.
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// An open stream plus the handle that cancels it.
pub struct StreamHandle {
    events: StreamEventStream,
    abort: AbortController,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

impl StreamHandle {
    pub fn new(events: StreamEventStream, abort: AbortController) -> Self {
        Self { events, abort }
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.next().await
    }

    pub fn abort_controller(&self) -> AbortController {
        self.abort.clone()
    }

    /// Abort the stream. Cancelling a finished or cancelled stream is a no-op.
    pub fn cancel(&self) -> bool {
        self.abort.abort()
    }
}

/// Opens streamed queries. At most one stream is active per transport.
pub trait StreamTransport: Send + Sync {
    /// Open a stream for `request`. A stream still active on this transport
    /// is aborted first. Must be called from within a tokio runtime.
    fn open_stream(&self, request: QueryRequest) -> StreamHandle;

    /// Abort the active stream, if any.
    fn cancel(&self) -> bool;
}

/// `StreamTransport` over HTTP with newline-delimited response frames.
pub struct HttpStreamTransport {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
    stream_read_timeout: Option<Duration>,
    active: Mutex<Option<AbortController>>,
}

impl std::fmt::Debug for HttpStreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamTransport")
            .field("endpoint", &self.endpoint)
            .field("stream_read_timeout", &self.stream_read_timeout)
            .finish()
    }
}

impl HttpStreamTransport {
    pub fn new(
        config: &ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout.connect)
            .build()
            .map_err(|error| TransportError::Configuration(error.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.stream_url(),
            credentials,
            stream_read_timeout: config.timeout.stream_read,
            active: Mutex::new(None),
        })
    }

    fn active_slot(&self) -> MutexGuard<'_, Option<AbortController>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StreamTransport for HttpStreamTransport {
    fn open_stream(&self, request: QueryRequest) -> StreamHandle {
        let abort = AbortController::new();
        if let Some(previous) = self.active_slot().replace(abort.clone()) {
            if previous.abort() {
                tracing::warn!("opening a stream while another is active; aborting the previous one");
            }
        }

        let (tx, rx) = mpsc::unbounded::<StreamEvent>();
        let task = StreamTask {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            credentials: self.credentials.clone(),
            stream_read_timeout: self.stream_read_timeout,
            request,
        };
        let signal = abort.signal();
        tokio::spawn(async move { task.run(signal, tx).await });

        StreamHandle::new(Box::pin(rx), abort)
    }

    fn cancel(&self) -> bool {
        match self.active_slot().take() {
            Some(active) => active.abort(),
            None => false,
        }
    }
}

struct StreamTask {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
    stream_read_timeout: Option<Duration>,
    request: QueryRequest,
}

impl StreamTask {
    async fn run(self, signal: AbortSignal, tx: mpsc::UnboundedSender<StreamEvent>) {
        let outcome = tokio::select! {
            biased;
            _ = signal.aborted() => Err(TransportError::Cancelled),
            result = self.drive(&tx) => result,
        };
        let _ = tx.unbounded_send(terminal_event(&signal, outcome));
    }

    async fn drive(
        &self,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<StreamCompletion, TransportError> {
        let response = send_with_refresh(self.credentials.as_ref(), |headers| {
            self.client
                .post(&self.endpoint)
                .headers(headers)
                .json(&self.request)
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(status.as_u16(), body));
        }

        let headers = response.headers().clone();
        let mut body = response.bytes_stream();
        let mut decoder = FrameDecoder::new();
        let mut full_text = String::new();

        loop {
            let next = match self.stream_read_timeout {
                Some(limit) => tokio::time::timeout(limit, body.next())
                    .await
                    .map_err(|_| TransportError::Reading("stream read timed out".to_string()))?,
                None => body.next().await,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|error| TransportError::Reading(error.to_string()))?;
            for frame in decoder.push(&chunk) {
                emit_frame(tx, &mut full_text, frame)?;
            }
        }

        if let Some(frame) = decoder.finish() {
            emit_frame(tx, &mut full_text, frame)?;
        }

        Ok(StreamCompletion::from_headers(full_text, &headers))
    }
}

fn emit_frame(
    tx: &mpsc::UnboundedSender<StreamEvent>,
    full_text: &mut String,
    frame: String,
) -> Result<(), TransportError> {
    full_text.push_str(&frame);
    // A dropped receiver means nobody is listening any more.
    tx.unbounded_send(StreamEvent::Frame(frame))
        .map_err(|_| TransportError::Cancelled)
}

/// Settle the signal and pick the single terminal event. An abort that
/// lands after the body ended but before settling still wins, so a
/// successful `cancel()` is always reported as `Cancelled`.
fn terminal_event(
    signal: &AbortSignal,
    outcome: Result<StreamCompletion, TransportError>,
) -> StreamEvent {
    let outcome = if signal.finish() {
        outcome
    } else {
        Err(TransportError::Cancelled)
    };
    match outcome {
        Ok(completion) => {
            tracing::debug!(
                conversation_id = %completion.conversation_id,
                chars = completion.full_text.len(),
                "stream completed"
            );
            StreamEvent::Complete(completion)
        }
        Err(error) => {
            tracing::debug!(kind = ?error.kind(), %error, "stream failed");
            StreamEvent::Failed(error)
        }
    }
}
