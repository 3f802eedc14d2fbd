//! Wire types shared with the chat backend
//!
//! Sessions and messages are owned by the backend; the client only ever holds
//! a read replica of them. [`TurnEvent`] is transient and exists only for the
//! duration of one streaming request.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | A conversation; created on the first message send |
//! | **Message** | One persisted utterance within a session |
//! | **Turn** | One prompt and the assistant reply it produces |
//! | **Retry** | Regenerating the latest assistant message in place |
//! | **Delta** | An incremental piece of assistant text |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Sessions
// ============================================

/// A chat session as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque identifier assigned by the backend
    pub id: String,
    /// Display title (may be empty until the backend names the session)
    #[serde(default)]
    pub title: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Most recent activity
    pub updated_at: DateTime<Utc>,
    /// Set when the session was soft-deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Extensible metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Session {
    /// Whether the session has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Title for display, falling back to a shortened id.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            format!("untitled ({})", short_id(&self.id))
        } else {
            self.title.clone()
        }
    }
}

/// Request body for `POST /api/chat/sessions`
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Response body for `GET /api/chat/sessions`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionList {
    #[serde(default)]
    pub sessions: Vec<Session>,
}

// ============================================
// Messages
// ============================================

/// Who authored a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person chatting
    User,
    /// The RAG assistant
    #[default]
    Assistant,
    /// System prompts and injected context
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// A persisted message.
///
/// Only `id` and `content` are required on the wire: `final` events may carry
/// a trimmed-down payload, in which case the remaining fields take their
/// defaults and are filled in by the next history refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned identifier
    pub id: String,
    /// Session this message belongs to
    #[serde(default)]
    pub session_id: String,
    /// Author role
    #[serde(default)]
    pub role: Role,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// When the backend stored the message
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Extensible metadata (token counts, retrieval sources, retry variants)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Message {
    /// Number of earlier variants recorded by retries.
    pub fn variant_count(&self) -> usize {
        self.metadata
            .get("variants")
            .and_then(|v| v.as_array())
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Token count reported by the backend, if any.
    pub fn token_count(&self) -> Option<u64> {
        self.metadata.get("token_count").and_then(|v| v.as_u64())
    }
}

// ============================================
// Pagination
// ============================================

/// Cursor-based page request for message history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Maximum number of messages to return
    pub limit: u32,
    /// Opaque cursor from a previous page; `None` for the most recent page
    pub cursor: Option<String>,
}

impl PageRequest {
    /// The most recent page of a session.
    pub fn latest(limit: u32) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }

    /// The page that precedes the one `cursor` was returned with.
    pub fn before(limit: u32, cursor: impl Into<String>) -> Self {
        Self {
            limit,
            cursor: Some(cursor.into()),
        }
    }
}

/// One page of message history, in chronological order.
///
/// The first page holds the most recent messages; `next_cursor` walks back
/// toward older ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

// ============================================
// Turns
// ============================================

/// Request body for starting a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRequest {
    /// The user prompt
    pub query: String,
    /// Number of retrieved chunks the backend should ground the answer on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TurnRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            metadata: None,
        }
    }
}

/// Request body for regenerating an assistant message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Response body of the non-streaming turn and retry endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnResult {
    /// The persisted prompt (absent for retries)
    #[serde(default)]
    pub user_message: Option<Message>,
    /// The persisted assistant reply
    #[serde(alias = "message", alias = "response")]
    pub assistant_message: Message,
}

impl TurnResult {
    /// The terminal event a stream would have ended with.
    pub fn into_event(self) -> TurnEvent {
        TurnEvent::Final {
            message: self.assistant_message,
        }
    }
}

/// Error payload of a protocol `error` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// One decoded event of a streamed turn.
///
/// The backend sends any number of `delta` events followed by exactly one
/// terminal `final` or `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Incremental assistant text
    Delta { delta: String },
    /// The authoritative persisted message
    Final {
        #[serde(alias = "response")]
        message: Message,
    },
    /// The backend failed the turn
    Error { error: TurnError },
}

impl TurnEvent {
    /// Wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            TurnEvent::Delta { .. } => "delta",
            TurnEvent::Final { .. } => "final",
            TurnEvent::Error { .. } => "error",
        }
    }

    /// Whether this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnEvent::Delta { .. })
    }
}

/// First eight characters of an id, for compact display.
pub fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(8)
        .map(|(idx, _)| &id[..idx])
        .unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_final_with_minimal_message() {
        let json = r#"{"type":"final","message":{"id":"m1","content":"Hi there"}}"#;
        let event: TurnEvent = serde_json::from_str(json).unwrap();
        match event {
            TurnEvent::Final { message } => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.content, "Hi there");
                assert_eq!(message.role, Role::Assistant);
                assert!(message.created_at.is_none());
            }
            other => panic!("expected final event, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_final_response_alias() {
        let json = r#"{"type":"final","response":{"id":"m2","content":"ok"}}"#;
        let event: TurnEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), "final");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_decode_error_event() {
        let json = r#"{"type":"error","error":{"code":"retrieval_failed","message":"index offline"}}"#;
        let event: TurnEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            TurnEvent::Error {
                error: TurnError {
                    code: "retrieval_failed".to_string(),
                    message: "index offline".to_string(),
                }
            }
        );
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let json = r#"{"type":"ping"}"#;
        assert!(serde_json::from_str::<TurnEvent>(json).is_err());
    }

    #[test]
    fn test_turn_request_skips_unset_fields() {
        let body = serde_json::to_value(TurnRequest::new("hello")).unwrap();
        assert_eq!(body, serde_json::json!({"query": "hello"}));
    }

    #[test]
    fn test_turn_result_into_event() {
        let json = r#"{"user_message":{"id":"u1","role":"user","content":"q"},"assistant_message":{"id":"a1","content":"a"}}"#;
        let result: TurnResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.user_message.as_ref().unwrap().role, Role::User);
        match result.into_event() {
            TurnEvent::Final { message } => assert_eq!(message.id, "a1"),
            other => panic!("expected final event, got {:?}", other),
        }
    }

    #[test]
    fn test_message_metadata_helpers() {
        let message: Message = serde_json::from_str(
            r#"{"id":"a1","content":"x","metadata":{"token_count":42,"variants":[{"content":"old"}]}}"#,
        )
        .unwrap();
        assert_eq!(message.token_count(), Some(42));
        assert_eq!(message.variant_count(), 1);
    }

    #[test]
    fn test_role_round_trip_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
