//! Per-turn state machine

use std::fmt;

use crate::types::Message;

/// Lifecycle of one in-flight turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// Request sent, no event applied yet
    Idle,
    /// At least one delta applied
    Streaming,
    /// Authoritative message adopted
    Completed,
    /// Server error event or transport failure
    Failed,
    /// Stopped by the caller before a terminal event
    Canceled,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Streaming => "streaming",
            TurnState::Completed => "completed",
            TurnState::Failed => "failed",
            TurnState::Canceled => "canceled",
        }
    }

    /// No further events may be applied in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::Failed | TurnState::Canceled
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an entry's content is not authoritative
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnFailure {
    /// The backend sent an `error` event
    Server { code: String, message: String },
    /// The request or the stream read failed
    Transport(String),
    /// The caller stopped the turn
    Canceled,
}

impl fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnFailure::Server { code, message } if code.is_empty() => f.write_str(message),
            TurnFailure::Server { code, message } => write!(f, "{} ({})", message, code),
            TurnFailure::Transport(message) => f.write_str(message),
            TurnFailure::Canceled => f.write_str("canceled"),
        }
    }
}

/// What a turn targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnKind {
    /// A fresh prompt; the assistant entry is created on demand
    New,
    /// Regeneration of an existing assistant message
    Retry { message_id: String },
}

/// How a driven turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed(Message),
    Failed(TurnFailure),
    Canceled,
}

/// Handle for one turn against one session's [`MessageList`](super::MessageList).
///
/// Created by `MessageList::begin_turn` or `MessageList::begin_retry`; all
/// transitions go through the list so the handle and the entries it owns
/// cannot drift apart.
#[derive(Debug)]
pub struct Turn {
    pub(super) session_id: String,
    pub(super) kind: TurnKind,
    pub(super) state: TurnState,
    /// Id of the entry this turn writes to, once one exists
    pub(super) slot: Option<String>,
    /// Id of the optimistic prompt entry of a new turn
    pub(super) prompt: Option<String>,
    pub(super) deltas: usize,
    pub(super) failure: Option<TurnFailure>,
}

impl Turn {
    pub(super) fn new(session_id: &str, kind: TurnKind) -> Self {
        let slot = match &kind {
            TurnKind::New => None,
            TurnKind::Retry { message_id } => Some(message_id.clone()),
        };
        Self {
            session_id: session_id.to_string(),
            kind,
            state: TurnState::Idle,
            slot,
            prompt: None,
            deltas: 0,
            failure: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn kind(&self) -> &TurnKind {
        &self.kind
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Id of the entry the turn currently writes to.
    pub fn entry_id(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    /// Id of the prompt entry a new turn added; `None` for retries.
    pub fn prompt_id(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Number of deltas applied so far.
    pub fn deltas_applied(&self) -> usize {
        self.deltas
    }

    pub fn failure(&self) -> Option<&TurnFailure> {
        self.failure.as_ref()
    }

    pub fn is_retry(&self) -> bool {
        matches!(self.kind, TurnKind::Retry { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TurnState::Idle.is_terminal());
        assert!(!TurnState::Streaming.is_terminal());
        assert!(TurnState::Completed.is_terminal());
        assert!(TurnState::Failed.is_terminal());
        assert!(TurnState::Canceled.is_terminal());
    }

    #[test]
    fn test_failure_display() {
        let failure = TurnFailure::Server {
            code: "rate_limited".to_string(),
            message: "slow down".to_string(),
        };
        assert_eq!(failure.to_string(), "slow down (rate_limited)");

        let failure = TurnFailure::Server {
            code: String::new(),
            message: "boom".to_string(),
        };
        assert_eq!(failure.to_string(), "boom");
        assert_eq!(TurnFailure::Canceled.to_string(), "canceled");
    }

    #[test]
    fn test_retry_turn_starts_bound_to_message() {
        let turn = Turn::new(
            "s1",
            TurnKind::Retry {
                message_id: "a1".to_string(),
            },
        );
        assert_eq!(turn.entry_id(), Some("a1"));
        assert!(turn.is_retry());
        assert_eq!(turn.state(), TurnState::Idle);

        assert_eq!(turn.prompt_id(), None);

        let turn = Turn::new("s1", TurnKind::New);
        assert_eq!(turn.entry_id(), None);
    }
}
