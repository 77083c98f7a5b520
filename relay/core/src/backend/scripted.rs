//! Scripted backend for tests
//!
//! Plays back a fixed fragment list (with optional delay and failure
//! points) so daemon and client behavior can be exercised without network
//! access. Requests are recorded for later inspection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{
    BackendError, GeneratedImage, ImageBackend, ImageRequest, StreamingToken, TextBackend,
    TextRequest,
};

/// Deterministic text and image backend
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    fragments: Vec<String>,
    fail_after: Option<(usize, String)>,
    fail_before_stream: Option<String>,
    delay: Option<Duration>,
    hang: bool,
    image: Option<Result<String, String>>,
    text_requests: Arc<Mutex<Vec<TextRequest>>>,
    image_requests: Arc<Mutex<Vec<ImageRequest>>>,
}

impl ScriptedBackend {
    /// Backend that streams `fragments` and completes
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Fail with `message` after `count` fragments have been sent
    #[must_use]
    pub fn failing_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }

    /// Refuse to open the stream at all
    #[must_use]
    pub fn failing_before_stream(mut self, message: impl Into<String>) -> Self {
        self.fail_before_stream = Some(message.into());
        self
    }

    /// Sleep before each fragment
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// After the fragments, keep the stream open until the receiver is dropped
    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Image generation returns `url`
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(Ok(url.into()));
        self
    }

    /// Image generation fails with `message`
    #[must_use]
    pub fn with_image_failure(mut self, message: impl Into<String>) -> Self {
        self.image = Some(Err(message.into()));
        self
    }

    /// Text requests received so far
    #[must_use]
    pub fn text_requests(&self) -> Vec<TextRequest> {
        self.text_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Image requests received so far
    #[must_use]
    pub fn image_requests(&self) -> Vec<ImageRequest> {
        self.image_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

fn scripted_failure(message: &str) -> BackendError {
    BackendError::Status {
        status: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl TextBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    async fn stream_text(
        &self,
        request: &TextRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        if let Ok(mut seen) = self.text_requests.lock() {
            seen.push(request.clone());
        }
        if let Some(ref message) = self.fail_before_stream {
            return Err(scripted_failure(message));
        }

        let (tx, rx) = mpsc::channel(16);
        let script = self.clone();

        tokio::spawn(async move {
            for (sent, fragment) in script.fragments.iter().enumerate() {
                if let Some((count, ref message)) = script.fail_after {
                    if sent == count {
                        let _ = tx.send(StreamingToken::Error(message.clone())).await;
                        return;
                    }
                }
                if let Some(delay) = script.delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(StreamingToken::Token(fragment.clone())).await.is_err() {
                    return;
                }
            }

            if let Some((_, message)) = script.fail_after {
                let _ = tx.send(StreamingToken::Error(message)).await;
                return;
            }
            if script.hang {
                tx.closed().await;
                return;
            }
            let _ = tx.send(StreamingToken::Complete).await;
        });

        Ok(rx)
    }
}

#[async_trait]
impl ImageBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage, BackendError> {
        if let Ok(mut seen) = self.image_requests.lock() {
            seen.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.image {
            Some(Ok(ref url)) => Ok(GeneratedImage {
                url: url.clone(),
                revised_prompt: None,
            }),
            Some(Err(ref message)) => Err(scripted_failure(message)),
            None => Err(BackendError::NoImage),
        }
    }
}
