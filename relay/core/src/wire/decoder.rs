//! Frame Reassembly
//!
//! Network reads do not line up with frames. A single chunk may carry half a
//! `data: ` prefix, three whole frames, or the first byte of a multi-byte
//! character. [`FrameDecoder`] buffers text across chunks and only hands out
//! lines that were terminated by a newline; the trailing partial line stays
//! buffered as the seed for the next chunk.
//!
//! Once a terminal frame (sentinel or error) has been produced the decoder
//! ignores everything after it, including the rest of the chunk it arrived in.

use super::frame::{DecodedLine, Frame};
use super::WireError;

/// Maximum bytes a single unterminated line may occupy in the buffer (1 MB)
///
/// Prevents unbounded growth when a peer never sends a line break.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Newline splitter over a byte stream
///
/// Decodes UTF-8 across chunk boundaries and yields complete lines with their
/// terminator removed. The text after the last newline is retained until a
/// later chunk completes it.
#[derive(Debug)]
pub struct LineBuffer {
    /// Decoded text after the last newline
    buffer: String,
    /// Trailing bytes of a multi-byte character split across chunks
    pending_utf8: Vec<u8>,
    max_line_bytes: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create a buffer with the default line limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_line_limit(MAX_LINE_BYTES)
    }

    /// Create a buffer with a custom line limit
    #[must_use]
    pub fn with_line_limit(max_line_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            pending_utf8: Vec::new(),
            max_line_bytes,
        }
    }

    /// Feed one chunk and return every line it completes
    ///
    /// # Errors
    ///
    /// Returns `WireError::LineTooLong` if the unterminated tail exceeds the
    /// line limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, WireError> {
        self.decode_utf8(chunk);

        // Split with a running offset and shift the buffer once per chunk
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].find('\n') {
            let end = start + pos;
            let line = &self.buffer[start..end];
            lines.push(line.strip_suffix('\r').unwrap_or(line).to_string());
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_line_bytes {
            return Err(WireError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }

        Ok(lines)
    }

    /// Append decoded text, holding back an incomplete trailing character
    fn decode_utf8(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending_utf8);
        bytes.extend_from_slice(chunk);

        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        // Genuinely invalid sequence: substitute and keep going
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete character at the end of the chunk
                        None => {
                            self.pending_utf8 = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Text received but not yet terminated by a newline
    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Take the unterminated remainder, if it holds anything but whitespace
    pub fn finish(&mut self) -> Option<String> {
        self.pending_utf8.clear();
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending_utf8.clear();
    }
}

/// Incremental frame reassembly state for one stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
    /// Set once a terminal frame has been produced
    terminated: bool,
}

impl FrameDecoder {
    /// Create a decoder with the default line limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom line limit
    #[must_use]
    pub fn with_line_limit(max_line_bytes: usize) -> Self {
        Self {
            lines: LineBuffer::with_line_limit(max_line_bytes),
            terminated: false,
        }
    }

    /// Feed one chunk and decode every line it completes
    ///
    /// Lines are returned in arrival order. Processing stops at the first
    /// terminal frame; later lines are dropped.
    ///
    /// # Errors
    ///
    /// Returns `WireError::LineTooLong` if the unterminated tail exceeds the
    /// line limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<DecodedLine>, WireError> {
        if self.terminated {
            return Ok(Vec::new());
        }

        let mut decoded = Vec::new();
        for line in self.lines.push(chunk)? {
            let item = Frame::parse_line(&line);
            let terminal = matches!(&item, DecodedLine::Frame(frame) if frame.is_terminal());
            decoded.push(item);

            if terminal {
                self.terminated = true;
                self.lines.clear();
                break;
            }
        }

        Ok(decoded)
    }

    /// Whether a terminal frame has been produced
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Text received but not yet resolved into a complete line
    #[must_use]
    pub fn buffered(&self) -> &str {
        self.lines.buffered()
    }

    /// Close out the stream, returning any unterminated remainder
    ///
    /// The remainder is never interpreted as a frame: a line without its
    /// terminating newline is incomplete by definition.
    pub fn finish(&mut self) -> Option<String> {
        self.lines.finish()
    }

    /// Reset for reuse
    pub fn clear(&mut self) {
        self.lines.clear();
        self.terminated = false;
    }
}
