//! Renderable message state of one session

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::state::{Turn, TurnFailure, TurnKind, TurnState};
use crate::error::{Error, Result};
use crate::types::{Message, Role, TurnEvent};

/// Prefix of ids the client assigns to optimistic entries
const PENDING_ID_PREFIX: &str = "pending-";

/// Whether an entry's content is authoritative
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// Matches what the backend stored
    Persisted,
    /// Optimistic; the backend has not confirmed it yet
    Pending,
    /// Partial or stale content left behind by a failed turn
    Failed(TurnFailure),
}

/// One row of the rendered conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub status: EntryStatus,
}

impl ChatEntry {
    fn persisted(message: Message) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
            metadata: message.metadata,
            status: EntryStatus::Persisted,
        }
    }

    fn pending(role: Role, content: String) -> Self {
        Self {
            id: format!("{}{}", PENDING_ID_PREFIX, Uuid::new_v4()),
            role,
            content,
            created_at: Some(Utc::now()),
            metadata: serde_json::Value::Null,
            status: EntryStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, EntryStatus::Failed(_))
    }

    pub fn failure(&self) -> Option<&TurnFailure> {
        match &self.status {
            EntryStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether the id was assigned by this client rather than the backend.
    pub fn is_local(&self) -> bool {
        self.id.starts_with(PENDING_ID_PREFIX)
    }
}

/// Ordered entries of one session plus the reducer that mutates them.
///
/// Persisted entries are never modified, with one exception: the entry a
/// retry turn targets.
#[derive(Debug, Clone)]
pub struct MessageList {
    session_id: String,
    entries: Vec<ChatEntry>,
}

impl MessageList {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
        }
    }

    /// Build a list from persisted history in chronological order.
    pub fn from_history(session_id: impl Into<String>, messages: &[Message]) -> Self {
        let mut list = Self::new(session_id);
        list.reconcile(messages);
        list
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ChatEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    /// Most recent assistant entry, the only one the backend lets you retry.
    pub fn latest_assistant(&self) -> Option<&ChatEntry> {
        self.entries.iter().rev().find(|e| e.role == Role::Assistant)
    }

    /// Replace every entry with the backend's persisted history.
    ///
    /// Call only while no turn is in flight for this session.
    pub fn reconcile(&mut self, messages: &[Message]) {
        self.entries = messages.iter().cloned().map(ChatEntry::persisted).collect();
    }

    /// Start a new turn: show the prompt optimistically and return the turn
    /// that will own the assistant placeholder.
    ///
    /// The prompt entry stays pending until the turn ends. A `final` event
    /// confirms it; any other ending marks it failed alongside the reply.
    pub fn begin_turn(&mut self, prompt: &str) -> Turn {
        let entry = ChatEntry::pending(Role::User, prompt.to_string());
        let mut turn = Turn::new(&self.session_id, TurnKind::New);
        turn.prompt = Some(entry.id.clone());
        self.entries.push(entry);
        tracing::debug!(session_id = %self.session_id, "Turn started");
        turn
    }

    /// Start a retry of an existing assistant message.
    ///
    /// Whether the message is the latest turn is for the backend to decide;
    /// a rejection arrives as an HTTP error or an `error` event.
    pub fn begin_retry(&mut self, message_id: &str) -> Result<Turn> {
        let entry = self
            .get(message_id)
            .ok_or_else(|| Error::MessageNotFound(message_id.to_string()))?;
        if entry.role != Role::Assistant {
            return Err(Error::NotAssistantMessage(message_id.to_string()));
        }
        tracing::debug!(session_id = %self.session_id, message_id, "Retry started");
        Ok(Turn::new(
            &self.session_id,
            TurnKind::Retry {
                message_id: message_id.to_string(),
            },
        ))
    }

    /// Apply one event to the turn and its entry, returning the new state.
    pub fn apply(&mut self, turn: &mut Turn, event: &TurnEvent) -> Result<TurnState> {
        self.check_session(turn)?;
        if turn.state.is_terminal() {
            return Err(Error::InvalidTransition {
                from: turn.state,
                event: event.kind(),
            });
        }

        match event {
            TurnEvent::Delta { delta } => {
                self.apply_delta(turn, delta)?;
                turn.state = TurnState::Streaming;
            }
            TurnEvent::Final { message } => {
                self.apply_final(turn, message);
                turn.state = TurnState::Completed;
            }
            TurnEvent::Error { error } => {
                let failure = TurnFailure::Server {
                    code: error.code.clone(),
                    message: error.message.clone(),
                };
                self.mark_failed(turn, failure);
                turn.state = TurnState::Failed;
            }
        }

        tracing::trace!(
            session_id = %self.session_id,
            state = %turn.state,
            deltas = turn.deltas,
            "Turn event applied"
        );
        Ok(turn.state)
    }

    /// Stop the turn before a terminal event.
    ///
    /// Partial content stays visible, flagged as canceled. Canceling a turn
    /// that already ended changes nothing.
    pub fn cancel(&mut self, turn: &mut Turn) -> Result<TurnState> {
        self.check_session(turn)?;
        if !turn.state.is_terminal() {
            self.mark_failed(turn, TurnFailure::Canceled);
            turn.state = TurnState::Canceled;
            tracing::debug!(
                session_id = %self.session_id,
                deltas = turn.deltas,
                "Turn canceled"
            );
        }
        Ok(turn.state)
    }

    /// Fail the turn because the request or stream broke.
    pub fn fail(&mut self, turn: &mut Turn, error: &Error) -> Result<TurnState> {
        self.check_session(turn)?;
        if !turn.state.is_terminal() {
            self.mark_failed(turn, TurnFailure::Transport(error.to_string()));
            turn.state = TurnState::Failed;
            tracing::debug!(
                session_id = %self.session_id,
                error = %error,
                "Turn failed"
            );
        }
        Ok(turn.state)
    }

    fn check_session(&self, turn: &Turn) -> Result<()> {
        if turn.session_id != self.session_id {
            return Err(Error::SessionMismatch {
                turn: turn.session_id.clone(),
                list: self.session_id.clone(),
            });
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn apply_delta(&mut self, turn: &mut Turn, delta: &str) -> Result<()> {
        let first = turn.deltas == 0;
        // Retries are bound to their message from the start; new turns
        // reserve the placeholder here.
        let idx = match turn.slot.as_deref() {
            Some(id) => self
                .position(id)
                .ok_or_else(|| Error::MessageNotFound(id.to_string()))?,
            None => {
                self.entries
                    .push(ChatEntry::pending(Role::Assistant, String::new()));
                let idx = self.entries.len() - 1;
                turn.slot = Some(self.entries[idx].id.clone());
                idx
            }
        };

        let entry = &mut self.entries[idx];
        if first && turn.is_retry() {
            // The regenerated text replaces the old variant.
            entry.content.clear();
        }
        entry.status = EntryStatus::Pending;
        entry.content.push_str(delta);
        turn.deltas += 1;
        Ok(())
    }

    fn apply_final(&mut self, turn: &mut Turn, message: &Message) {
        let mut message = message.clone();
        if message.session_id.is_empty() {
            message.session_id = self.session_id.clone();
        }
        let id = message.id.clone();
        let entry = ChatEntry::persisted(message);

        // The backend answered, so it accepted the prompt.
        if let Some(idx) = turn.prompt.as_deref().and_then(|p| self.position(p)) {
            self.entries[idx].status = EntryStatus::Persisted;
        }

        match turn.slot.as_deref().and_then(|slot| self.position(slot)) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
        turn.slot = Some(id);
    }

    fn mark_failed(&mut self, turn: &mut Turn, failure: TurnFailure) {
        for id in [turn.prompt.as_deref(), turn.slot.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(idx) = self.position(id) {
                self.entries[idx].status = EntryStatus::Failed(failure.clone());
            }
        }
        turn.failure = Some(failure);
    }
}
