//! Frame to [`TurnEvent`] decoding

use crate::error::{Error, Result};
use crate::types::TurnEvent;

/// Joined `data:` payload of a raw frame, if it has one.
///
/// Lines may end in `\n` or `\r\n`. Only lines starting with `data:` count;
/// the prefix and a single following space are stripped and the remaining
/// values are joined with `\n`. Comments, `event:`, `id:` and `retry:` lines
/// are ignored.
pub fn frame_data(frame: &str) -> Option<String> {
    let values: Vec<&str> = frame
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    let data = values.join("\n");
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

/// Decode one raw frame.
///
/// Frames without data yield `Ok(None)`. A payload that is not a valid
/// [`TurnEvent`] is fatal for the stream.
pub fn decode_frame(frame: &str) -> Result<Option<TurnEvent>> {
    let Some(payload) = frame_data(frame) else {
        return Ok(None);
    };

    match serde_json::from_str(&payload) {
        Ok(event) => Ok(Some(event)),
        Err(source) => Err(Error::Decode { payload, source }),
    }
}
