//! SSE pipeline for streamed chat turns
//!
//! A turn response body is a sequence of frames separated by a blank line,
//! each frame carrying one JSON [`TurnEvent`](crate::types::TurnEvent) on its
//! `data:` lines:
//!
//! ```text
//! bytes ──► FrameSplitter ──► decode_frame ──► TurnStream
//!           (blank-line       (data: lines,     (lazy, cancelable,
//!            boundaries)       JSON parse)       pull-based)
//! ```
//!
//! New turns and retries share this pipeline; they differ only in the URL and
//! request body the [`ChatClient`](crate::client::ChatClient) sends.

mod decode;
mod driver;
mod frame;

pub use decode::{decode_frame, frame_data};
pub use driver::{turn_events, TurnStream};
pub use frame::FrameSplitter;
