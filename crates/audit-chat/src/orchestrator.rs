//! Session orchestrator: one conversation, one in-flight answer at a time.
//!
//! A turn moves `Idle -> Streaming -> Idle`. [`SessionOrchestrator::begin_turn`]
//! appends the user question and an empty assistant placeholder and opens the
//! stream; [`SessionOrchestrator::apply_event`] folds each [`StreamEvent`] into
//! the conversation. A completed stream freezes the answer and attaches its
//! metadata; a failed or cancelled one removes the placeholder and records an
//! error message, leaving the question in place.

use std::sync::Arc;
use std::time::Instant;

use crate::backend::SessionBackend;
use crate::config::ClientConfig;
use crate::conversation::Conversation;
use crate::errors::{SessionError, TransportError};
use crate::filters::{DocumentBuckets, RequestFilters, categorize_documents, extract_filenames};
use crate::stream::{StreamEvent, StreamHandle, StreamTransport};
use crate::types::{
    ConversationContext, Document, Exchange, ExchangePatch, ExchangeStatus, QueryRequest,
};

/// Similarity parameters sent with every question.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuerySettings {
    pub match_threshold: f64,
    pub match_count: u32,
}

impl From<&ClientConfig> for QuerySettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            match_threshold: config.match_threshold,
            match_count: config.match_count,
        }
    }
}

/// Where the conversation's initial exchanges came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryOrigin {
    /// Prior exchanges were loaded.
    Resumed(usize),
    /// No history exists for this conversation id.
    Fresh,
    /// History could not be fetched for another reason; started empty.
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitSummary {
    pub conversation_id: String,
    pub session_name: String,
    pub compliance_domain: String,
    pub history: HistoryOrigin,
    pub documents: usize,
}

/// Lifecycle flags for callers rendering the conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub loading: bool,
    pub streaming: bool,
    pub error: Option<String>,
}

/// Identity of the turn currently streaming.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTurn {
    pub user_id: String,
    pub assistant_id: String,
}

#[derive(Debug)]
enum TurnState {
    Idle,
    Streaming {
        turn: PendingTurn,
        started: Instant,
    },
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Completed {
        assistant_id: String,
        sources: Vec<String>,
        response_time_ms: u64,
    },
    Failed {
        user_id: String,
        error: TransportError,
    },
    /// The turn was already rolled back by [`SessionOrchestrator::cancel_turn`].
    Abandoned,
}

/// Cancels the orchestrator's in-flight stream from another task.
#[derive(Clone)]
pub struct TurnCanceller {
    transport: Arc<dyn StreamTransport>,
}

impl TurnCanceller {
    pub fn cancel(&self) -> bool {
        self.transport.cancel()
    }
}

pub struct SessionOrchestrator {
    backend: Arc<dyn SessionBackend>,
    transport: Arc<dyn StreamTransport>,
    settings: QuerySettings,
    conversation: Option<Conversation>,
    documents: Vec<Document>,
    buckets: DocumentBuckets,
    turn: TurnState,
    loading: bool,
    error: Option<String>,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field(
                "conversation_id",
                &self.conversation.as_ref().map(Conversation::conversation_id),
            )
            .field("turn", &self.turn)
            .field("loading", &self.loading)
            .field("error", &self.error)
            .finish()
    }
}

pub fn new_exchange_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SessionOrchestrator {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        transport: Arc<dyn StreamTransport>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            backend,
            transport,
            settings,
            conversation: None,
            documents: Vec::new(),
            buckets: DocumentBuckets::default(),
            turn: TurnState::Idle,
            loading: false,
            error: None,
        }
    }

    /// Bind the orchestrator to `conversation_id` within audit session `session_id`.
    ///
    /// Only a failure to load the session context is fatal. Missing history
    /// starts a fresh conversation; missing documents leave the buckets empty.
    pub async fn initialize(
        &mut self,
        session_id: &str,
        conversation_id: &str,
    ) -> Result<InitSummary, SessionError> {
        self.reset();
        self.loading = true;

        let session = match self.backend.audit_session(session_id).await {
            Ok(session) => session,
            Err(source) => {
                self.loading = false;
                tracing::warn!(session_id, error = %source, "audit session unavailable");
                return Err(SessionError::Initialization {
                    session_id: session_id.to_string(),
                    source,
                });
            }
        };

        let context = ConversationContext {
            conversation_id: conversation_id.to_string(),
            audit_session_id: session_id.to_string(),
            compliance_domain: session.compliance_domain.clone(),
        };

        let (history, origin) = match self.backend.chat_history(conversation_id).await {
            Ok(history) if history.is_empty() => (Vec::new(), HistoryOrigin::Fresh),
            Ok(mut history) => {
                // Nothing will ever complete a pending answer from a previous run.
                for exchange in &mut history {
                    exchange.status = ExchangeStatus::Complete;
                }
                let count = history.len();
                (history, HistoryOrigin::Resumed(count))
            }
            Err(error) if error.is_not_found() => {
                tracing::debug!(conversation_id, "no prior history; starting fresh");
                (Vec::new(), HistoryOrigin::Fresh)
            }
            Err(error) => {
                tracing::warn!(conversation_id, %error, "chat history unavailable; starting fresh");
                (Vec::new(), HistoryOrigin::Unavailable(error.to_string()))
            }
        };

        match self.backend.session_documents(session_id).await {
            Ok(documents) => {
                self.buckets = categorize_documents(&documents);
                self.documents = documents;
            }
            Err(error) => {
                tracing::warn!(session_id, %error, "session documents unavailable");
            }
        }

        self.conversation = Some(Conversation::with_history(
            context,
            session.session_name.clone(),
            history,
        ));
        self.loading = false;

        tracing::info!(
            session_id,
            conversation_id,
            domain = %session.compliance_domain,
            documents = self.documents.len(),
            "conversation initialized"
        );

        Ok(InitSummary {
            conversation_id: conversation_id.to_string(),
            session_name: session.session_name,
            compliance_domain: session.compliance_domain,
            history: origin,
            documents: self.documents.len(),
        })
    }

    /// Append the question and an empty answer, then open the answer stream.
    pub fn begin_turn(&mut self, text: &str) -> Result<StreamHandle, SessionError> {
        let Some(conversation) = self.conversation.as_mut() else {
            return Err(SessionError::NoActiveSession);
        };
        if matches!(self.turn, TurnState::Streaming { .. }) {
            return Err(SessionError::TurnInProgress);
        }

        let context = conversation.context().clone();
        let user_id = new_exchange_id();
        conversation.append(Exchange::user(user_id.clone(), text, &context));
        self.error = None;

        let filters = RequestFilters::derive(&self.documents);
        let assistant_id = new_exchange_id();
        conversation.append(Exchange::assistant_placeholder(
            assistant_id.clone(),
            &context,
        ));

        let request = filters.apply(
            QueryRequest::new(
                text,
                self.settings.match_threshold,
                self.settings.match_count,
            )
            .with_context(&context),
        );

        tracing::debug!(
            conversation_id = %context.conversation_id,
            %assistant_id,
            "turn started"
        );
        self.turn = TurnState::Streaming {
            turn: PendingTurn {
                user_id,
                assistant_id,
            },
            started: Instant::now(),
        };
        Ok(self.transport.open_stream(request))
    }

    /// Fold one stream event into the conversation.
    ///
    /// Returns the outcome once a terminal event ends the turn. Events that
    /// arrive while no turn is streaming are ignored.
    pub fn apply_event(&mut self, event: StreamEvent) -> Option<TurnOutcome> {
        let TurnState::Streaming { turn, started } = &self.turn else {
            tracing::debug!("stream event without an active turn ignored");
            return None;
        };
        let conversation = self.conversation.as_mut()?;

        match event {
            StreamEvent::Frame(token) => {
                let previous = conversation
                    .find_by_id(&turn.assistant_id)
                    .map(|exchange| exchange.text.as_str())
                    .unwrap_or_default();
                let text = format!("{previous}{token}");
                conversation.mutate(&turn.assistant_id, ExchangePatch::text(text));
                None
            }
            StreamEvent::Complete(completion) => {
                let sources = extract_filenames(&completion);
                let response_time_ms = started.elapsed().as_millis() as u64;
                conversation.mutate(
                    &turn.assistant_id,
                    ExchangePatch::completion(
                        sources.clone(),
                        response_time_ms,
                        completion.metadata(),
                    ),
                );
                let assistant_id = turn.assistant_id.clone();
                self.turn = TurnState::Idle;
                tracing::debug!(%assistant_id, response_time_ms, "turn completed");
                Some(TurnOutcome::Completed {
                    assistant_id,
                    sources,
                    response_time_ms,
                })
            }
            StreamEvent::Failed(error) => {
                conversation.remove(&turn.assistant_id);
                let user_id = turn.user_id.clone();
                self.error = Some(error.user_message());
                self.turn = TurnState::Idle;
                tracing::warn!(kind = ?error.kind(), %error, "turn failed; answer rolled back");
                Some(TurnOutcome::Failed { user_id, error })
            }
        }
    }

    /// Run one full turn: ask `text` and consume the answer stream.
    pub async fn send_utterance(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        let mut stream = self.begin_turn(text)?;
        Ok(self.drive_turn(&mut stream).await)
    }

    /// Consume `stream` until the current turn ends.
    pub async fn drive_turn(&mut self, stream: &mut StreamHandle) -> TurnOutcome {
        self.drive_turn_with(stream, |_| {}).await
    }

    /// Like [`Self::drive_turn`], handing each frame to `on_frame` as it arrives.
    pub async fn drive_turn_with<F>(
        &mut self,
        stream: &mut StreamHandle,
        mut on_frame: F,
    ) -> TurnOutcome
    where
        F: FnMut(&str),
    {
        while let Some(event) = stream.next_event().await {
            if let StreamEvent::Frame(frame) = &event {
                on_frame(frame);
            }
            if let Some(outcome) = self.apply_event(event) {
                return outcome;
            }
        }
        // The sender went away without a terminal event.
        self.apply_event(StreamEvent::Failed(TransportError::Reading(
            "stream closed without a result".to_string(),
        )))
        .unwrap_or(TurnOutcome::Abandoned)
    }

    /// Abort the in-flight answer and roll it back. Returns whether a turn was
    /// streaming.
    pub fn cancel_turn(&mut self) -> bool {
        self.transport.cancel();
        self.apply_event(StreamEvent::Failed(TransportError::Cancelled))
            .is_some()
    }

    /// Handle for cancelling the in-flight stream while a turn is being driven.
    /// The driving task still sees the cancellation and rolls the answer back.
    pub fn canceller(&self) -> TurnCanceller {
        TurnCanceller {
            transport: self.transport.clone(),
        }
    }

    /// Tear down: abort any stream and discard the conversation without rollback.
    pub fn shutdown(mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        if matches!(self.turn, TurnState::Streaming { .. }) {
            self.transport.cancel();
        }
        self.turn = TurnState::Idle;
        self.conversation = None;
        self.documents.clear();
        self.buckets = DocumentBuckets::default();
        self.error = None;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            loading: self.loading,
            streaming: matches!(self.turn, TurnState::Streaming { .. }),
            error: self.error.clone(),
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn pending_turn(&self) -> Option<&PendingTurn> {
        match &self.turn {
            TurnState::Streaming { turn, .. } => Some(turn),
            TurnState::Idle => None,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document_buckets(&self) -> &DocumentBuckets {
        &self.buckets
    }

    /// Filters the next question would be sent with.
    pub fn request_filters(&self) -> RequestFilters {
        RequestFilters::derive(&self.documents)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if matches!(self.turn, TurnState::Streaming { .. }) {
            self.transport.cancel();
        }
    }
}
