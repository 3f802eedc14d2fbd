//! # ragchat-core
//!
//! Core library for ragchat - a client for a retrieval-augmented chat backend.
//!
//! This library provides:
//! - Wire types for sessions, messages, and streamed turn events
//! - An SSE pipeline that turns a response body into typed [`TurnEvent`]s
//! - A reducer that folds those events into renderable message state
//! - A per-session cache of paginated message history
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A chat turn flows through three stages:
//! - **Transport:** [`ChatClient`] opens a `text/event-stream` request and
//!   exposes the body as a cancelable [`TurnStream`]
//! - **Reduction:** [`turn::drive_turn`] applies each event to a
//!   [`MessageList`] through a per-turn state machine
//! - **Reconciliation:** [`ChatController`] refreshes the [`MessageCache`]
//!   after completion so persisted state supersedes optimistic state
//!
//! ## Example
//!
//! ```rust,no_run
//! use ragchat_core::{ChatClient, ChatController, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> ragchat_core::Result<()> {
//! let config = Config::load()?;
//! let client = ChatClient::new(&config.backend)?;
//! let controller = ChatController::new(client, config.chat.clone());
//!
//! let mut list = controller.open_session("session-1").await?;
//! let outcome = controller
//!     .send(&mut list, "What changed in v2?", &CancellationToken::new(), &mut ())
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use cache::{MessageCache, MessageSource, SessionHistory};
pub use chat::ChatController;
pub use client::{ChatBackend, ChatClient};
pub use config::Config;
pub use error::{Error, Result};
pub use stream::TurnStream;
pub use turn::{ChatEntry, EntryStatus, MessageList, Turn, TurnFailure, TurnOutcome, TurnState};
pub use types::*;

// Public modules
pub mod cache;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod stream;
pub mod turn;
pub mod types;
