//! Error types for ragchat-core

use thiserror::Error;

use crate::turn::TurnState;

/// Main error type for the ragchat-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error for non-streaming response bodies
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx response from the backend
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The backend answered a streaming request without an event stream
    #[error("streaming is not supported for this response")]
    StreamingUnsupported,

    /// A `data:` payload was not a valid turn event
    #[error("malformed event payload {payload:?}: {source}")]
    Decode {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    /// Request could not be sent, or the connection failed mid-read
    #[error("network error: {0}")]
    Network(String),

    /// The event stream violated the turn protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Session is not present in the local cache
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Message is not present in the local message list
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// Retry targeted a message that is not an assistant message
    #[error("message {0} is not an assistant message")]
    NotAssistantMessage(String),

    /// A second turn was started while one is still streaming
    #[error("a turn is already in flight for session {0}")]
    TurnInFlight(String),

    /// A turn was applied to the message list of another session
    #[error("turn for session {turn} applied to message list of session {list}")]
    SessionMismatch { turn: String, list: String },

    /// An event arrived for a turn that already reached a terminal state
    #[error("cannot apply {event} event to a {from} turn")]
    InvalidTransition { from: TurnState, event: &'static str },
}

impl Error {
    /// HTTP status of a transport error, if this is one
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for ragchat-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = Error::Http {
            status: 422,
            message: "query too long".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 422: query too long");
        assert_eq!(err.http_status(), Some(422));
        assert_eq!(Error::StreamingUnsupported.http_status(), None);
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidTransition {
            from: TurnState::Completed,
            event: "delta",
        };
        assert_eq!(err.to_string(), "cannot apply delta event to a completed turn");
    }
}
