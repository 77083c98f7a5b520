//! Stream Consumer
//!
//! Reads a text turn's response body chunk by chunk, reassembles frames with
//! [`FrameDecoder`], and forwards each content fragment as soon as it is
//! decoded. Processing stops at the first terminal frame, even when more
//! bytes follow it; the body is dropped right there, releasing the reader.

use futures::StreamExt;
use relay_core::{DecodedLine, Frame, FrameDecoder};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::ByteStream;

/// Progress of one turn, sent from the turn task to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A decoded content fragment
    Content(String),
    /// The turn is over
    Ended(TurnEnd),
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEnd {
    /// `[DONE]` received
    Sentinel,
    /// Body ended without a sentinel (treated as success)
    EndOfStream,
    /// Image generated
    Image {
        /// Image location
        url: String,
        /// The prompt it was generated from
        prompt: String,
    },
    /// Error frame, error response, or transport failure
    Failed(String),
    /// Cancelled by the user
    Cancelled,
}

impl TurnEnd {
    /// Whether the turn completed without error
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sentinel | Self::EndOfStream | Self::Image { .. })
    }
}

/// Consume `body` until a terminal frame, end of stream, failure, or cancel
///
/// Content fragments go to `events` in arrival order. The returned value says
/// how the stream ended; the caller reports it.
pub async fn consume_stream(
    mut body: ByteStream,
    cancel: &CancellationToken,
    events: &mpsc::Sender<TurnEvent>,
) -> TurnEnd {
    let mut decoder = FrameDecoder::new();

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return TurnEnd::Cancelled,
            chunk = body.next() => chunk,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return TurnEnd::Failed(e.to_string()),
            None => {
                if let Some(rest) = decoder.finish() {
                    debug!(remainder = %rest, "Discarding unterminated trailing data");
                }
                return TurnEnd::EndOfStream;
            }
        };

        let lines = match decoder.push(&bytes) {
            Ok(lines) => lines,
            Err(e) => return TurnEnd::Failed(e.to_string()),
        };

        for line in lines {
            match line {
                DecodedLine::Frame(Frame::Content(text)) => {
                    if events.send(TurnEvent::Content(text)).await.is_err() {
                        return TurnEnd::Cancelled;
                    }
                }
                DecodedLine::Frame(Frame::Done) => {
                    drop(body);
                    return TurnEnd::Sentinel;
                }
                DecodedLine::Frame(Frame::Error(message)) => {
                    drop(body);
                    return TurnEnd::Failed(message);
                }
                DecodedLine::Malformed { line, reason } => {
                    warn!(%line, %reason, "Skipping malformed frame");
                }
                DecodedLine::Skipped => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use bytes::Bytes;
    use futures::stream;
    use pretty_assertions::assert_eq;

    fn body_from(chunks: Vec<&'static str>) -> ByteStream {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes())))).boxed()
    }

    async fn run(body: ByteStream) -> (Vec<String>, TurnEnd) {
        let (tx, mut rx) = mpsc::channel(64);
        let end = consume_stream(body, &CancellationToken::new(), &tx).await;
        drop(tx);
        let mut content = Vec::new();
        while let Some(TurnEvent::Content(text)) = rx.recv().await {
            content.push(text);
        }
        (content, end)
    }

    #[tokio::test]
    async fn test_fragments_in_order() {
        let (content, end) = run(body_from(vec![
            "data: {\"content\":\"Hel\"}\n\ndata: {\"con",
            "tent\":\"lo\"}\n",
            "\ndata: {\"content\":\" there\"}\n\nda",
            "ta: [DONE]\n\n",
        ]))
        .await;
        assert_eq!(content, vec!["Hel", "lo", " there"]);
        assert_eq!(end, TurnEnd::Sentinel);
    }

    #[tokio::test]
    async fn test_sentinel_stops_before_trailing_bytes() {
        let (content, end) = run(body_from(vec![
            "data: {\"content\":\"a\"}\n\ndata: [DONE]\n\ndata: {\"content\":\"late\"}\n\n",
            "data: {\"content\":\"later\"}\n\n",
        ]))
        .await;
        assert_eq!(content, vec!["a"]);
        assert_eq!(end, TurnEnd::Sentinel);
    }

    #[tokio::test]
    async fn test_error_frame_ends_turn() {
        let (content, end) = run(body_from(vec![
            "data: {\"content\":\"a\"}\n\ndata: {\"error\":\"boom\"}\n\n",
        ]))
        .await;
        assert_eq!(content, vec!["a"]);
        assert_eq!(end, TurnEnd::Failed("boom".to_string()));
    }

    #[tokio::test]
    async fn test_end_of_stream_without_sentinel() {
        let (content, end) = run(body_from(vec![
            "data: {\"content\":\"a\"}\n\ndata: {\"content\":\"unterminated\"}",
        ]))
        .await;
        assert_eq!(content, vec!["a"]);
        assert_eq!(end, TurnEnd::EndOfStream);
    }

    #[tokio::test]
    async fn test_malformed_line_skipped() {
        let (content, end) = run(body_from(vec![
            "data: {broken\n\ndata: {\"content\":\"ok\"}\n\ndata: [DONE]\n\n",
        ]))
        .await;
        assert_eq!(content, vec!["ok"]);
        assert_eq!(end, TurnEnd::Sentinel);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n\n")),
            Err(ClientError::Decode("connection reset".to_string())),
        ])
        .boxed();
        let (content, end) = run(body).await;
        assert_eq!(content, vec!["a"]);
        assert_eq!(
            end,
            TurnEnd::Failed("Invalid response: connection reset".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let body = stream::iter(vec![Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n\n"))])
            .chain(stream::pending())
            .boxed();
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(8);

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { consume_stream(body, &cancel, &tx).await })
        };

        assert_eq!(rx.recv().await, Some(TurnEvent::Content("a".to_string())));
        cancel.cancel();
        assert_eq!(task.await.unwrap(), TurnEnd::Cancelled);
    }

    #[test]
    fn test_suspends_until_next_chunk() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(8);
        let body: ByteStream = stream::pending().boxed();

        let mut consume = tokio_test::task::spawn(consume_stream(body, &cancel, &tx));
        tokio_test::assert_pending!(consume.poll());
        tokio_test::assert_pending!(consume.poll());

        cancel.cancel();
        assert!(consume.is_woken());
        assert_eq!(
            tokio_test::assert_ready!(consume.poll()),
            TurnEnd::Cancelled
        );
    }

    #[test]
    fn test_turn_end_success() {
        assert!(TurnEnd::Sentinel.is_success());
        assert!(TurnEnd::EndOfStream.is_success());
        assert!(!TurnEnd::Failed("x".into()).is_success());
        assert!(!TurnEnd::Cancelled.is_success());
    }
}
