//! Consuming loop that drives a turn from an event stream

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::list::MessageList;
use super::state::{Turn, TurnFailure, TurnOutcome, TurnState};
use crate::error::{Error, Result};
use crate::types::{Message, TurnEvent};

/// Receives progress while a turn is driven.
///
/// All methods default to no-ops; `()` observes nothing.
pub trait TurnObserver {
    /// A delta was appended to the turn's entry.
    fn on_delta(&mut self, _delta: &str) {}

    /// The authoritative message replaced the turn's entry.
    fn on_complete(&mut self, _message: &Message) {}

    /// The turn failed; partial content remains on the entry.
    fn on_failure(&mut self, _failure: &TurnFailure) {}

    /// The turn was canceled by the caller.
    fn on_cancel(&mut self) {}
}

impl TurnObserver for () {}

/// Apply `events` to `turn` until it reaches a terminal state.
///
/// The token is checked before every event, so nothing is applied once
/// cancellation has been observed, even events the stream already holds.
/// Protocol `error` events end in [`TurnOutcome::Failed`]. Stream errors, and
/// a stream that closes without a terminal event, fail the turn and are
/// returned as `Err` for the caller to surface.
///
/// Only the [`TurnEvent`] contract is relied on: streamed bodies, blocking
/// results and synthetic test sequences are all driven the same way.
pub async fn drive_turn<S>(
    list: &mut MessageList,
    turn: &mut Turn,
    events: S,
    cancel: &CancellationToken,
    observer: &mut dyn TurnObserver,
) -> Result<TurnOutcome>
where
    S: Stream<Item = Result<TurnEvent>>,
{
    let mut events = std::pin::pin!(events);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancel_turn(list, turn, observer),
            next = events.next() => next,
        };
        if cancel.is_cancelled() {
            return cancel_turn(list, turn, observer);
        }

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(fail_turn(list, turn, observer, e)),
            None => {
                let e = Error::Protocol("stream closed before a terminal event".to_string());
                return Err(fail_turn(list, turn, observer, e));
            }
        };

        list.apply(turn, &event)?;
        match event {
            TurnEvent::Delta { delta } => observer.on_delta(&delta),
            TurnEvent::Final { message } => {
                tracing::debug!(
                    session_id = %turn.session_id(),
                    message_id = %message.id,
                    deltas = turn.deltas_applied(),
                    "Turn completed"
                );
                observer.on_complete(&message);
                return Ok(TurnOutcome::Completed(message));
            }
            TurnEvent::Error { .. } => {
                let failure = turn
                    .failure()
                    .cloned()
                    .unwrap_or_else(|| TurnFailure::Transport("unknown failure".to_string()));
                tracing::info!(
                    session_id = %turn.session_id(),
                    failure = %failure,
                    "Backend failed the turn"
                );
                observer.on_failure(&failure);
                return Ok(TurnOutcome::Failed(failure));
            }
        }
    }
}

fn cancel_turn(
    list: &mut MessageList,
    turn: &mut Turn,
    observer: &mut dyn TurnObserver,
) -> Result<TurnOutcome> {
    if list.cancel(turn)? == TurnState::Canceled {
        observer.on_cancel();
    }
    Ok(TurnOutcome::Canceled)
}

fn fail_turn(
    list: &mut MessageList,
    turn: &mut Turn,
    observer: &mut dyn TurnObserver,
    error: Error,
) -> Error {
    if let Err(e) = list.fail(turn, &error) {
        return e;
    }
    if let Some(failure) = turn.failure() {
        observer.on_failure(failure);
    }
    error
}
