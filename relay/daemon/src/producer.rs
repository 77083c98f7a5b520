//! Stream Producer
//!
//! Re-frames upstream fragments as wire frames, one frame per fragment, in
//! arrival order. Exactly one terminal frame is written: the sentinel when
//! the upstream is exhausted, or one error frame when it fails.
//!
//! ```text
//! upstream rx ──► Token("Hel") ──► data: {"content":"Hel"}\n\n ──► body tx
//!             ──► Complete     ──► data: [DONE]\n\n
//! ```
//!
//! If the response body is dropped (client went away) the producer returns
//! immediately and drops the upstream receiver, which stops the backend.

use bytes::Bytes;
use relay_core::{Frame, StreamingToken, STREAM_ERROR_FALLBACK};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// How a produced stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// Sentinel written
    Completed {
        /// Content frames written
        fragments: usize,
    },
    /// Error frame written
    Failed {
        /// Content frames written before the failure
        fragments: usize,
        /// Message carried by the error frame
        message: String,
    },
    /// Response body closed before a terminal frame
    ClientGone {
        /// Content frames written
        fragments: usize,
    },
}

fn encode_or_fallback(frame: &Frame) -> Option<Bytes> {
    match frame.encode() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(error = %e, "Failed to encode frame");
            Frame::stream_error(e.to_string()).encode().ok()
        }
    }
}

/// Forward `upstream` into `body` as encoded frames until a terminal frame
///
/// An upstream channel that closes without `Complete` counts as exhaustion.
pub async fn produce_frames(
    mut upstream: mpsc::Receiver<StreamingToken>,
    body: mpsc::Sender<Bytes>,
) -> ProduceOutcome {
    let mut fragments = 0;

    loop {
        let token = tokio::select! {
            () = body.closed() => {
                debug!(fragments, "Client disconnected, dropping upstream");
                return ProduceOutcome::ClientGone { fragments };
            }
            token = upstream.recv() => token,
        };

        let frame = match token {
            Some(StreamingToken::Token(text)) if text.is_empty() => continue,
            Some(StreamingToken::Token(text)) => Frame::Content(text),
            Some(StreamingToken::Complete) | None => Frame::Done,
            Some(StreamingToken::Error(message)) => Frame::stream_error(message),
        };

        let Some(bytes) = encode_or_fallback(&frame) else {
            return ProduceOutcome::Failed {
                fragments,
                message: STREAM_ERROR_FALLBACK.to_string(),
            };
        };

        if body.send(bytes).await.is_err() {
            debug!(fragments, "Client disconnected, dropping upstream");
            return ProduceOutcome::ClientGone { fragments };
        }

        match frame {
            Frame::Content(_) => fragments += 1,
            Frame::Done => return ProduceOutcome::Completed { fragments },
            Frame::Error(message) => return ProduceOutcome::Failed { fragments, message },
        }
    }
}
