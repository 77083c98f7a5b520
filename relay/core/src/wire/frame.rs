//! Frame encoding and single-line decoding.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::WireError;

/// Prefix every frame line starts with
pub const DATA_PREFIX: &str = "data: ";

/// Literal payload of the terminal success frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// Blank-line terminator that closes a frame
pub const FRAME_TERMINATOR: &str = "\n\n";

/// Error message used when a failure carries no text of its own
pub const STREAM_ERROR_FALLBACK: &str = "Stream error occurred";

/// One unit of the event stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A fragment of generated text, carried verbatim
    Content(String),
    /// Production failed; no further frames follow
    Error(String),
    /// Normal end of stream
    Done,
}

#[derive(Serialize)]
struct ContentPayload<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
}

/// Decoded JSON payload of a `data:` line
#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Outcome of decoding one complete line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedLine {
    /// The line carried a frame
    Frame(Frame),
    /// Blank separator, non-`data:` line, or a payload with nothing to apply
    Skipped,
    /// The payload was not valid JSON; the stream continues
    Malformed {
        /// The offending line, without its prefix
        line: String,
        /// Decoder error message
        reason: String,
    },
}

impl Frame {
    /// Create a content frame
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }

    /// Create an error frame
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Create an error frame for a failed stream
    ///
    /// Decoders skip an empty `error` field, so a blank message is replaced
    /// with [`STREAM_ERROR_FALLBACK`] to keep the failure visible.
    pub fn stream_error(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::Error(STREAM_ERROR_FALLBACK.to_string())
        } else {
            Self::Error(message)
        }
    }

    /// Whether this frame ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done)
    }

    /// Encode to wire bytes: `data: <payload>\n\n`
    ///
    /// # Errors
    ///
    /// Returns `WireError::Encode` if the payload cannot be serialized.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let payload = match self {
            Self::Content(text) => serde_json::to_string(&ContentPayload { content: text })?,
            Self::Error(message) => serde_json::to_string(&ErrorPayload { error: message })?,
            Self::Done => DONE_SENTINEL.to_string(),
        };

        let mut line =
            String::with_capacity(DATA_PREFIX.len() + payload.len() + FRAME_TERMINATOR.len());
        line.push_str(DATA_PREFIX);
        line.push_str(&payload);
        line.push_str(FRAME_TERMINATOR);
        Ok(Bytes::from(line))
    }

    /// Decode one complete line (without its trailing newline)
    ///
    /// An `error` field takes precedence over `content`. Empty strings in
    /// either field carry nothing and are skipped.
    #[must_use]
    pub fn parse_line(line: &str) -> DecodedLine {
        let line = line.trim_end_matches('\r');
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return DecodedLine::Skipped;
        };

        if data == DONE_SENTINEL {
            return DecodedLine::Frame(Self::Done);
        }

        match serde_json::from_str::<Payload>(data) {
            Ok(Payload {
                error: Some(error), ..
            }) if !error.is_empty() => DecodedLine::Frame(Self::Error(error)),
            Ok(Payload {
                content: Some(content),
                ..
            }) if !content.is_empty() => DecodedLine::Frame(Self::Content(content)),
            Ok(_) => DecodedLine::Skipped,
            Err(e) => DecodedLine::Malformed {
                line: data.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_content() {
        let bytes = Frame::content("Hel").encode().unwrap();
        assert_eq!(&bytes[..], b"data: {\"content\":\"Hel\"}\n\n");
    }

    #[test]
    fn test_encode_error() {
        let bytes = Frame::error("boom").encode().unwrap();
        assert_eq!(&bytes[..], b"data: {\"error\":\"boom\"}\n\n");
    }

    #[test]
    fn test_stream_error_never_blank() {
        assert_eq!(Frame::stream_error("boom"), Frame::Error("boom".into()));
        assert_eq!(
            Frame::stream_error(""),
            Frame::Error(STREAM_ERROR_FALLBACK.into())
        );
        assert_eq!(
            Frame::stream_error(" \n"),
            Frame::Error(STREAM_ERROR_FALLBACK.into())
        );
    }

    #[test]
    fn test_encode_sentinel_is_not_json() {
        let bytes = Frame::Done.encode().unwrap();
        assert_eq!(&bytes[..], b"data: [DONE]\n\n");
    }

    #[test]
    fn test_encode_escapes_newlines_in_content() {
        // A fragment containing newlines must stay on one wire line
        let bytes = Frame::content("line one\n\nline two").encode().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text.matches('\n').count(), 2);
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_parse_line_frames() {
        assert_eq!(
            Frame::parse_line("data: {\"content\":\"lo\"}"),
            DecodedLine::Frame(Frame::content("lo"))
        );
        assert_eq!(
            Frame::parse_line("data: {\"error\":\"bad\"}"),
            DecodedLine::Frame(Frame::error("bad"))
        );
        assert_eq!(
            Frame::parse_line("data: [DONE]"),
            DecodedLine::Frame(Frame::Done)
        );
    }

    #[test]
    fn test_parse_line_error_wins_over_content() {
        assert_eq!(
            Frame::parse_line("data: {\"content\":\"x\",\"error\":\"bad\"}"),
            DecodedLine::Frame(Frame::error("bad"))
        );
    }

    #[test]
    fn test_parse_line_skips_non_data_lines() {
        assert_eq!(Frame::parse_line(""), DecodedLine::Skipped);
        assert_eq!(Frame::parse_line(": keep-alive"), DecodedLine::Skipped);
        assert_eq!(Frame::parse_line("event: message"), DecodedLine::Skipped);
        assert_eq!(Frame::parse_line("data: {}"), DecodedLine::Skipped);
        assert_eq!(
            Frame::parse_line("data: {\"content\":\"\"}"),
            DecodedLine::Skipped
        );
    }

    #[test]
    fn test_parse_line_tolerates_crlf() {
        assert_eq!(
            Frame::parse_line("data: [DONE]\r"),
            DecodedLine::Frame(Frame::Done)
        );
    }

    #[test]
    fn test_parse_line_malformed() {
        match Frame::parse_line("data: {\"content\":\"unterminated") {
            DecodedLine::Malformed { line, .. } => {
                assert_eq!(line, "{\"content\":\"unterminated");
            }
            other => panic!("Expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_encoded_frame_parses_back() {
        let frame = Frame::content("emoji 🦎 and \"quotes\"");
        let bytes = frame.encode().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        let line = text.trim_end_matches('\n');
        assert_eq!(Frame::parse_line(line), DecodedLine::Frame(frame));
    }

    #[test]
    fn test_is_terminal() {
        assert!(!Frame::content("a").is_terminal());
        assert!(Frame::error("e").is_terminal());
        assert!(Frame::Done.is_terminal());
    }
}
