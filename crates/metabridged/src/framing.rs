//! Newline-delimited framing for the channel byte stream.
//!
//! Each connection owns one [`MessageFramer`]. Reads append raw bytes; the
//! framer hands back one complete message at a time and keeps any trailing
//! partial message buffered for the next read.

use thiserror::Error;

/// Byte terminating every message on the wire.
pub const DELIMITER: u8 = b'\n';

/// Errors surfaced while framing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffered bytes exceeded the bound without a delimiter.
    #[error("message exceeds {limit} byte limit without a delimiter ({buffered} bytes buffered)")]
    TooLarge { buffered: usize, limit: usize },
}

/// Accumulates bytes and splits them on [`DELIMITER`].
#[derive(Debug)]
pub struct MessageFramer {
    buffer: Vec<u8>,
    // Offset up to which `buffer` is known not to contain a delimiter.
    scanned: usize,
    max_message_bytes: usize,
}

impl MessageFramer {
    /// Creates a framer that rejects messages longer than `max_message_bytes`.
    #[must_use]
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_message_bytes,
        }
    }

    /// Appends freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete message.
    ///
    /// The message excludes the delimiter and has surrounding ASCII whitespace
    /// trimmed, so an empty line yields an empty message. Returns `Ok(None)`
    /// when no delimiter is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] when the unterminated tail exceeds the
    /// configured bound. The framer cannot resynchronise after this.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let unscanned = self.buffer.get(self.scanned..).unwrap_or_default();
        match unscanned.iter().position(|byte| *byte == DELIMITER) {
            Some(offset) => {
                let end = self.scanned + offset;
                let mut frame: Vec<u8> = self.buffer.drain(..=end).collect();
                frame.pop();
                self.scanned = 0;
                if frame.len() > self.max_message_bytes {
                    return Err(self.too_large(frame.len()));
                }
                Ok(Some(trim_ascii_whitespace(frame)))
            }
            None => {
                self.scanned = self.buffer.len();
                if self.buffer.len() > self.max_message_bytes {
                    return Err(self.too_large(self.buffer.len()));
                }
                Ok(None)
            }
        }
    }

    /// Number of bytes waiting for a delimiter.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn too_large(&self, buffered: usize) -> FrameError {
        FrameError::TooLarge {
            buffered,
            limit: self.max_message_bytes,
        }
    }
}

fn trim_ascii_whitespace(frame: Vec<u8>) -> Vec<u8> {
    let trimmed = frame.trim_ascii();
    if trimmed.len() == frame.len() {
        return frame;
    }
    trimmed.to_vec()
}
