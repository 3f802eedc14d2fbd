//! Body bytes to a lazy, cancelable [`TurnEvent`] stream

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::decode::decode_frame;
use super::frame::FrameSplitter;
use crate::error::{Error, Result};
use crate::types::TurnEvent;

/// Pull-based sequence of decoded events for one turn.
///
/// Ends after the connection closes, after the first error item, or as soon
/// as the turn's cancellation token fires.
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send>>;

/// Wire a response body through the frame splitter and event decoder.
///
/// Reading is lazy: a chunk is only pulled from `body` when the consumer asks
/// for the next event. Once `cancel` fires the pending read is abandoned, the
/// body (and with it the connection) is dropped, and no further item is
/// produced, including events already decoded from the last chunk.
pub fn turn_events<S, E>(body: S, cancel: CancellationToken) -> TurnStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut splitter = FrameSplitter::new();
        let mut decoded = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(events = decoded, "Turn stream canceled");
                    break;
                }
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    tracing::warn!(events = decoded, error = %e, "Turn stream read failed");
                    yield Err(Error::Network(e.to_string()));
                    break;
                }
                None => {
                    let discarded = splitter.finish();
                    if discarded > 0 {
                        tracing::debug!(bytes = discarded, "Discarded incomplete trailing frame");
                    }
                    tracing::debug!(events = decoded, "Turn stream closed");
                    break;
                }
            };

            let frames = match splitter.push(&chunk) {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::warn!(error = %e, "Turn stream carried an unreadable frame");
                    yield Err(e);
                    return;
                }
            };
            for frame in frames {
                if cancel.is_cancelled() {
                    tracing::debug!(events = decoded, "Turn stream canceled");
                    return;
                }
                match decode_frame(&frame) {
                    Ok(Some(event)) => {
                        decoded += 1;
                        yield Ok(event);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Turn stream carried a malformed frame");
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    })
}
