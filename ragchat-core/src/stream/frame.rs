//! Blank-line frame splitting over a chunked byte stream

use crate::error::{Error, Result};

/// Reassembles raw SSE frames from arbitrarily chunked bytes.
///
/// A frame ends at the first `\n\n` or `\r\n\r\n`. Bytes are buffered until a
/// boundary arrives, so frames (and multi-byte characters) may straddle any
/// number of chunks.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
    /// Offset below which the buffer is known to hold no boundary
    scanned: usize,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in order.
    ///
    /// A completed frame that is not valid UTF-8 fails the push with
    /// [`Error::Protocol`]; the stream cannot be trusted past that point.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((start, len)) = find_boundary(&self.buffer, self.scanned) {
            let frame: Vec<u8> = self.buffer.drain(..start + len).take(start).collect();
            self.scanned = 0;
            let frame = String::from_utf8(frame)
                .map_err(|e| Error::Protocol(format!("frame is not valid UTF-8: {}", e)))?;
            frames.push(frame);
        }
        // A boundary may still complete across the last three bytes.
        self.scanned = self.buffer.len().saturating_sub(3);

        Ok(frames)
    }

    /// Number of buffered bytes not yet part of a complete frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard the incomplete tail at end of stream.
    ///
    /// Returns how many bytes were dropped. A truncated final frame is not an
    /// error; the backend always terminates its last frame.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        discarded
    }
}

/// Earliest `(start, delimiter_len)` at or after `from`.
fn find_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "data: {\"type\":\"delta\",\"delta\":\"Hé\"}\n\n\
                          : keep-alive\n\n\
                          data: {\"type\":\"delta\",\"delta\":\"llo\"}\r\n\r\n\
                          data: {\"type\":\"final\",\"message\":{\"id\":\"m1\",\"content\":\"Héllo\"}}\n\n";

    fn split_whole(input: &[u8]) -> Vec<String> {
        let mut splitter = FrameSplitter::new();
        splitter.push(input).unwrap()
    }

    #[test]
    fn test_single_chunk() {
        let frames = split_whole(STREAM.as_bytes());
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], "data: {\"type\":\"delta\",\"delta\":\"Hé\"}");
        assert_eq!(frames[1], ": keep-alive");
        assert_eq!(frames[2], "data: {\"type\":\"delta\",\"delta\":\"llo\"}");
    }

    #[test]
    fn test_every_two_way_split_matches_unchunked() {
        let bytes = STREAM.as_bytes();
        let expected = split_whole(bytes);

        for cut in 0..=bytes.len() {
            let mut splitter = FrameSplitter::new();
            let mut frames = splitter.push(&bytes[..cut]).unwrap();
            frames.extend(splitter.push(&bytes[cut..]).unwrap());
            assert_eq!(frames, expected, "split at byte {}", cut);
            assert_eq!(splitter.pending_len(), 0);
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_unchunked() {
        let bytes = STREAM.as_bytes();
        let expected = split_whole(bytes);

        let mut splitter = FrameSplitter::new();
        let frames: Vec<String> = bytes
            .iter()
            .flat_map(|b| splitter.push(std::slice::from_ref(b)).unwrap())
            .collect();
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_uneven_chunk_sizes_match_unchunked() {
        let bytes = STREAM.as_bytes();
        let expected = split_whole(bytes);

        for size in [2, 3, 5, 7, 11, 64] {
            let mut splitter = FrameSplitter::new();
            let frames: Vec<String> = bytes
                .chunks(size)
                .flat_map(|c| splitter.push(c).unwrap())
                .collect();
            assert_eq!(frames, expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_partial_frame_is_held_back() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.push(b"data: {\"type\":").unwrap().is_empty());
        assert!(splitter.push(b"\"delta\"}\n").unwrap().is_empty());
        assert_eq!(
            splitter.push(b"\ndata").unwrap(),
            vec!["data: {\"type\":\"delta\"}"]
        );
        assert_eq!(splitter.pending_len(), 4);
    }

    #[test]
    fn test_finish_discards_trailing_bytes() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(b"data: {}\n\ndata: {\"trunc").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(splitter.finish(), "data: {\"trunc".len());
        assert_eq!(splitter.pending_len(), 0);
    }

    #[test]
    fn test_empty_frames_are_emitted_as_empty() {
        let frames = split_whole(b"\n\n\n\n");
        assert_eq!(frames, vec!["".to_string(), "".to_string()]);
    }

    #[test]
    fn test_invalid_utf8_frame_is_an_error() {
        let mut splitter = FrameSplitter::new();
        let err = splitter
            .push(b"data: {\"type\":\"delta\",\"delta\":\"\xff\"}\n\n")
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ref msg) if msg.contains("UTF-8")));
    }

    #[test]
    fn test_character_split_across_chunks_is_kept() {
        let bytes = "data: é\n\n".as_bytes();
        let mut splitter = FrameSplitter::new();
        // Cut inside the two-byte character.
        assert!(splitter.push(&bytes[..7]).unwrap().is_empty());
        assert_eq!(splitter.push(&bytes[7..]).unwrap(), vec!["data: é"]);
    }
}
