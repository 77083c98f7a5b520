//! Wire Protocol
//!
//! The contract shared by the relay daemon (which writes frames) and chat
//! clients (which reassemble and decode them).
//!
//! # Frame Format
//!
//! ```text
//! data: {"content":"Hel"}\n\n      incremental content
//! data: {"error":"rate limited"}\n\n   terminal failure
//! data: [DONE]\n\n                  terminal sentinel (not JSON)
//! ```
//!
//! Every frame is one UTF-8 line prefixed with `data: ` and terminated by a
//! blank line. A stream ends with exactly one terminal frame: the sentinel on
//! success, or a single error frame on failure.

pub mod body;
pub mod decoder;
pub mod frame;

use thiserror::Error;

pub use body::{ErrorBody, ImageChatReply, ImageChatRequest, ImageChatResponse, TextChatRequest};
pub use decoder::{FrameDecoder, LineBuffer, MAX_LINE_BYTES};
pub use frame::{
    DecodedLine, Frame, DATA_PREFIX, DONE_SENTINEL, FRAME_TERMINATOR, STREAM_ERROR_FALLBACK,
};

/// Errors raised while encoding or reassembling frames
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload could not be serialized
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// A single line grew past the reassembly limit without a newline
    #[error("Frame line exceeds {limit} bytes without a line break")]
    LineTooLong {
        /// Configured limit in bytes
        limit: usize,
    },
}
