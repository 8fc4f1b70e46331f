//! Incremental parser for the chat streaming wire protocol.
//!
//! The backend streams frames of the form `data: <payload>\n\n`. Network reads
//! can split a frame anywhere (inside the prefix, inside the delimiter, inside
//! a multi-byte character), so the parser buffers raw bytes and only cuts at a
//! fully received delimiter.

use memchr::memmem;
use tracing::debug;

pub const FRAME_DELIMITER: &[u8] = b"\n\n";
pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";
pub const ERROR_SENTINEL_PREFIX: &str = "[error]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Verbatim content delta.
    Content(String),
    /// Payload carrying the error sentinel; never part of the reply text.
    Error(String),
    /// Termination sentinel.
    Done,
}

/// Push-based frame splitter. Feed chunks in receipt order with [`push`].
///
/// [`push`]: StreamFrameParser::push
#[derive(Debug, Default)]
pub struct StreamFrameParser {
    buffer: Vec<u8>,
    // Offset from which the next delimiter search starts; everything before
    // it is known not to contain the start of a delimiter.
    scan_from: usize,
    finished: bool,
}

impl StreamFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes, in order.
    ///
    /// Once the termination sentinel has been seen the remaining buffer is
    /// discarded and later chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.finished {
            if !chunk.is_empty() {
                debug!(bytes = chunk.len(), "Ignoring bytes received after [DONE]");
            }
            return frames;
        }

        self.buffer.extend_from_slice(chunk);

        let mut frame_start = 0;
        while let Some(offset) = memmem::find(&self.buffer[self.scan_from..], FRAME_DELIMITER) {
            let frame_end = self.scan_from + offset;
            let frame = classify_frame(&self.buffer[frame_start..frame_end]);
            frame_start = frame_end + FRAME_DELIMITER.len();
            self.scan_from = frame_start;

            match frame {
                Some(Frame::Done) => {
                    frames.push(Frame::Done);
                    self.finish();
                    return frames;
                }
                Some(frame) => frames.push(frame),
                None => {}
            }
        }

        self.buffer.drain(..frame_start);
        // A delimiter may straddle the next chunk boundary; rescan the tail.
        self.scan_from = self
            .buffer
            .len()
            .saturating_sub(FRAME_DELIMITER.len() - 1);
        frames
    }

    /// Mark the stream as ended, discarding any incomplete trailing frame.
    ///
    /// Returns the number of buffered bytes that were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 && !self.finished {
            debug!(bytes = dropped, "Discarding incomplete trailing frame");
        }
        self.buffer.clear();
        self.scan_from = 0;
        self.finished = true;
        dropped
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Classify one complete frame. Frames without a `data:` line (comments,
/// keep-alives) and empty payloads produce nothing.
fn classify_frame(raw: &[u8]) -> Option<Frame> {
    let text = String::from_utf8_lossy(raw);
    let payload = text.strip_prefix(DATA_PREFIX)?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload == DONE_SENTINEL {
        return Some(Frame::Done);
    }
    if let Some(detail) = payload.strip_prefix(ERROR_SENTINEL_PREFIX) {
        return Some(Frame::Error(detail.trim().to_string()));
    }
    if payload.is_empty() {
        return None;
    }
    Some(Frame::Content(payload.to_string()))
}

/// Concatenate the content deltas of a frame sequence.
pub fn collect_content<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> String {
    frames
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Content(delta) => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}
