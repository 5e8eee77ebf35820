//! Conversation state and its reducer operations.
//!
//! All operations are synchronous and infallible; the orchestrator is the only
//! writer.

use crate::types::{ConversationContext, Exchange, ExchangePatch, ExchangeStatus, Role};

/// One chat thread: identity, domain scope, and ordered exchanges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conversation {
    context: ConversationContext,
    session_name: String,
    exchanges: Vec<Exchange>,
}

impl Conversation {
    pub fn new(context: ConversationContext, session_name: impl Into<String>) -> Self {
        Self {
            context,
            session_name: session_name.into(),
            exchanges: Vec::new(),
        }
    }

    /// Resume a conversation from previously stored exchanges.
    pub fn with_history(
        context: ConversationContext,
        session_name: impl Into<String>,
        history: Vec<Exchange>,
    ) -> Self {
        let mut conversation = Self::new(context, session_name);
        for exchange in history {
            conversation.append(exchange);
        }
        conversation
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn conversation_id(&self) -> &str {
        &self.context.conversation_id
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Add to the end of the list. Ids are caller-generated and assumed unique.
    pub fn append(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    /// Apply a partial update. Unknown ids are ignored.
    ///
    /// Text is only replaced on an in-flight assistant exchange, and only with
    /// a value that extends the current text.
    pub fn mutate(&mut self, id: &str, patch: ExchangePatch) -> bool {
        let Some(exchange) = self.exchanges.iter_mut().find(|exchange| exchange.id == id) else {
            tracing::debug!(id, "mutate on unknown exchange ignored");
            return false;
        };

        if let Some(text) = patch.text {
            if exchange.role == Role::Assistant
                && exchange.status == ExchangeStatus::Pending
                && text.starts_with(&exchange.text)
            {
                exchange.text = text;
            } else {
                tracing::debug!(id, "text update on frozen exchange ignored");
            }
        }
        if let Some(sources) = patch.sources {
            exchange.sources = sources;
        }
        if let Some(response_time_ms) = patch.response_time_ms {
            exchange.response_time_ms = Some(response_time_ms);
        }
        if let Some(metadata) = patch.metadata {
            exchange.metadata = Some(metadata);
        }
        if let Some(status) = patch.status {
            exchange.status = status;
        }
        true
    }

    /// Delete the exchange with `id`. Survivors keep their order.
    pub fn remove(&mut self, id: &str) -> Option<Exchange> {
        let index = self
            .exchanges
            .iter()
            .position(|exchange| exchange.id == id)?;
        Some(self.exchanges.remove(index))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Exchange> {
        self.exchanges.iter().find(|exchange| exchange.id == id)
    }

    /// The assistant exchange still receiving frames, if any.
    pub fn in_flight(&self) -> Option<&Exchange> {
        self.exchanges.iter().find(|exchange| exchange.is_in_flight())
    }

    pub fn last_completed_answer(&self) -> Option<&Exchange> {
        self.exchanges
            .iter()
            .rev()
            .find(|exchange| exchange.role == Role::Assistant && !exchange.is_in_flight())
    }
}
