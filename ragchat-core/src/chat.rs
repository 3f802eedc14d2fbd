//! Chat controller: one entry point per user action
//!
//! [`ChatController`] owns the backend, the session message cache and the set
//! of sessions with a turn in flight. It picks the transport for each turn,
//! drives the turn through the reducer, and reconciles the session's history
//! once the backend has persisted the result.
//!
//! | Outcome | Cache |
//! |---------|-------|
//! | Completed | refreshed, message list replaced by persisted history |
//! | Canceled | invalidated, refetched on next load |
//! | Failed | invalidated, refetched on next load |
//!
//! A request that fails before any stream opens leaves the cache alone.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::cache::{MessageCache, SessionHistory};
use crate::client::ChatBackend;
use crate::config::{ChatConfig, Transport};
use crate::error::{Error, Result};
use crate::turn::{drive_turn, MessageList, Turn, TurnObserver, TurnOutcome};
use crate::types::{RetryRequest, TurnEvent, TurnRequest, TurnResult};

type Events<'a> = BoxStream<'a, Result<TurnEvent>>;

/// Coordinates turns, retries and history for one backend
pub struct ChatController<B> {
    backend: B,
    settings: ChatConfig,
    cache: tokio::sync::Mutex<MessageCache>,
    busy: Mutex<HashSet<String>>,
}

impl<B: ChatBackend> ChatController<B> {
    pub fn new(backend: B, settings: ChatConfig) -> Self {
        let cache = MessageCache::new(settings.page_size);
        Self {
            backend,
            settings,
            cache: tokio::sync::Mutex::new(cache),
            busy: Mutex::new(HashSet::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &ChatConfig {
        &self.settings
    }

    /// Message list of a session, built from its most recent history page.
    pub async fn open_session(&self, session_id: &str) -> Result<MessageList> {
        let mut cache = self.cache.lock().await;
        let history = cache.load(&self.backend, session_id).await?;
        Ok(MessageList::from_history(session_id, &history.messages))
    }

    /// Cached history of a session, fetching the latest page on a miss.
    pub async fn history(&self, session_id: &str) -> Result<SessionHistory> {
        let mut cache = self.cache.lock().await;
        cache.load(&self.backend, session_id).await.cloned()
    }

    /// Extend a session's history by one older page.
    pub async fn history_more(&self, session_id: &str) -> Result<SessionHistory> {
        let mut cache = self.cache.lock().await;
        cache.load_more(&self.backend, session_id).await.cloned()
    }

    /// A session's complete history.
    pub async fn history_all(&self, session_id: &str) -> Result<SessionHistory> {
        let mut cache = self.cache.lock().await;
        cache.load_all(&self.backend, session_id).await.cloned()
    }

    pub async fn is_cached(&self, session_id: &str) -> bool {
        self.cache.lock().await.contains(session_id)
    }

    /// Drop a session's cached history.
    pub async fn invalidate(&self, session_id: &str) -> bool {
        self.cache.lock().await.invalidate(session_id)
    }

    /// Whether a turn is currently in flight for the session.
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(session_id)
    }

    /// Send a prompt and drive the assistant reply into `list`.
    ///
    /// Fails with [`Error::TurnInFlight`] if the session already has a turn
    /// streaming. Request errors fail the turn and are returned.
    pub async fn send(
        &self,
        list: &mut MessageList,
        prompt: &str,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let session_id = list.session_id().to_string();
        let _busy = self.acquire(&session_id)?;

        let request = TurnRequest {
            query: prompt.to_string(),
            top_k: self.settings.top_k,
            metadata: None,
        };
        let turn = list.begin_turn(prompt);
        let events = self.open_turn(&session_id, &request, cancel).await;
        self.run_turn(list, turn, events, cancel, observer).await
    }

    /// Regenerate an assistant message in place.
    pub async fn retry(
        &self,
        list: &mut MessageList,
        message_id: &str,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let session_id = list.session_id().to_string();
        let _busy = self.acquire(&session_id)?;

        let request = RetryRequest {
            top_k: self.settings.top_k,
            metadata: None,
        };
        let turn = list.begin_retry(message_id)?;
        let events = self
            .open_retry(&session_id, message_id, &request, cancel)
            .await;
        self.run_turn(list, turn, events, cancel, observer).await
    }

    fn acquire(&self, session_id: &str) -> Result<BusyGuard<'_>> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(session_id.to_string()) {
            tracing::info!(session_id, "Rejected turn: another turn is in flight");
            return Err(Error::TurnInFlight(session_id.to_string()));
        }
        Ok(BusyGuard {
            busy: &self.busy,
            session_id: session_id.to_string(),
        })
    }

    async fn open_turn<'a>(
        &'a self,
        session_id: &'a str,
        request: &'a TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<Events<'a>> {
        let blocking = move || blocking_events(self.backend.send_turn(session_id, request));

        match self.settings.transport {
            Transport::Blocking => Ok(blocking()),
            Transport::Stream => Ok(self
                .backend
                .open_turn_stream(session_id, request, cancel.clone())
                .await?),
            Transport::Auto => {
                match self
                    .backend
                    .open_turn_stream(session_id, request, cancel.clone())
                    .await
                {
                    Ok(events) => Ok(events),
                    Err(Error::StreamingUnsupported) => {
                        tracing::info!(session_id, "Streaming unsupported, using blocking turn");
                        Ok(blocking())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn open_retry<'a>(
        &'a self,
        session_id: &'a str,
        message_id: &'a str,
        request: &'a RetryRequest,
        cancel: &CancellationToken,
    ) -> Result<Events<'a>> {
        let blocking =
            move || blocking_events(self.backend.retry_turn(session_id, message_id, request));

        match self.settings.transport {
            Transport::Blocking => Ok(blocking()),
            Transport::Stream => Ok(self
                .backend
                .open_retry_stream(session_id, message_id, request, cancel.clone())
                .await?),
            Transport::Auto => {
                match self
                    .backend
                    .open_retry_stream(session_id, message_id, request, cancel.clone())
                    .await
                {
                    Ok(events) => Ok(events),
                    Err(Error::StreamingUnsupported) => {
                        tracing::info!(
                            session_id,
                            message_id,
                            "Streaming unsupported, using blocking retry"
                        );
                        Ok(blocking())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn run_turn(
        &self,
        list: &mut MessageList,
        mut turn: Turn,
        events: Result<Events<'_>>,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let events = match events {
            Ok(events) => events,
            Err(e) => {
                list.fail(&mut turn, &e)?;
                if let Some(failure) = turn.failure() {
                    observer.on_failure(failure);
                }
                return Err(e);
            }
        };

        let result = drive_turn(list, &mut turn, events, cancel, observer).await;
        match &result {
            Ok(TurnOutcome::Completed(_)) => self.reconcile(list).await,
            _ => {
                // The backend may have stored the prompt, or even the reply;
                // the next load picks up whatever it persisted.
                self.invalidate(list.session_id()).await;
            }
        }
        result
    }

    /// Replace optimistic entries with the persisted history.
    ///
    /// On a refresh failure the list keeps the entries the `final` event
    /// already settled, and the session stays out of the cache.
    async fn reconcile(&self, list: &mut MessageList) {
        let mut cache = self.cache.lock().await;
        match cache.refresh(&self.backend, list.session_id()).await {
            Ok(history) => list.reconcile(&history.messages),
            Err(e) => tracing::warn!(
                session_id = %list.session_id(),
                error = %e,
                "Failed to refresh history after turn"
            ),
        }
    }
}

/// Wrap a blocking call as a one-event stream so it drives like a stream.
fn blocking_events<'a, F>(result: F) -> Events<'a>
where
    F: Future<Output = Result<TurnResult>> + Send + 'a,
{
    stream::once(async move { result.await.map(TurnResult::into_event) }).boxed()
}

/// Marks a session busy until dropped
struct BusyGuard<'a> {
    busy: &'a Mutex<HashSet<String>>,
    session_id: String,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.session_id);
    }
}
