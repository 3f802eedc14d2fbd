//! HTTP transport for the chat backend
//!
//! [`ChatClient`] talks to the backend's chat API. Streaming endpoints return
//! a [`TurnStream`]; blocking endpoints return the whole [`TurnResult`].
//! [`ChatBackend`] is the seam the [`ChatController`](crate::chat::ChatController)
//! drives, so tests can substitute an in-memory backend.

mod error_body;
mod http;

pub use error_body::error_message;
pub use http::ChatClient;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::MessageSource;
use crate::error::Result;
use crate::stream::TurnStream;
use crate::types::{RetryRequest, TurnRequest, TurnResult};

/// Turn endpoints of a chat backend
#[async_trait]
pub trait ChatBackend: MessageSource {
    /// Start a turn and stream its events.
    ///
    /// Fails with [`Error::StreamingUnsupported`](crate::Error::StreamingUnsupported)
    /// when the backend answers without an event stream.
    async fn open_turn_stream(
        &self,
        session_id: &str,
        request: &TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnStream>;

    /// Regenerate an assistant message and stream the replacement.
    async fn open_retry_stream(
        &self,
        session_id: &str,
        message_id: &str,
        request: &RetryRequest,
        cancel: CancellationToken,
    ) -> Result<TurnStream>;

    /// Start a turn and wait for the persisted result.
    async fn send_turn(&self, session_id: &str, request: &TurnRequest) -> Result<TurnResult>;

    /// Regenerate an assistant message and wait for the persisted result.
    async fn retry_turn(
        &self,
        session_id: &str,
        message_id: &str,
        request: &RetryRequest,
    ) -> Result<TurnResult>;
}
