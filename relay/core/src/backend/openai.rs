//! OpenAI Backend Implementation
//!
//! Text and image generation against the OpenAI REST API (or any
//! compatible server reachable at `upstream.base_url`).
//!
//! # Endpoints
//!
//! - `/v1/chat/completions` - streaming chat, one user message per request
//! - `/v1/images/generations` - single image, returned by URL
//!
//! The chat stream is itself server-sent events. Each `data:` line carries a
//! completion chunk whose `choices[0].delta.content` is forwarded as one
//! [`StreamingToken::Token`]; `data: [DONE]` ends it.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::traits::{
    BackendError, GeneratedImage, ImageBackend, ImageRequest, StreamingToken, TextBackend,
    TextRequest,
};
use crate::config::UpstreamSettings;
use crate::wire::{LineBuffer, STREAM_ERROR_FALLBACK};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI backend client
#[derive(Clone)]
pub struct OpenAiBackend {
    api_key: String,
    settings: UpstreamSettings,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.settings.base_url)
            .field("chat_model", &self.settings.chat_model)
            .field("image_model", &self.settings.image_model)
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Create a backend using `api_key`
    ///
    /// Only the connect phase has a client-wide timeout; a total timeout
    /// would cut long chat streams short. Image requests get
    /// `settings.request_timeout` individually.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::MissingCredential` for an empty key, or
    /// `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, settings: UpstreamSettings) -> Result<Self, BackendError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BackendError::MissingCredential);
        }
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            api_key,
            settings,
            http_client,
        })
    }

    /// Create from an optional key, as read from configuration
    ///
    /// # Errors
    ///
    /// Same as [`OpenAiBackend::new`]; an absent key is `MissingCredential`.
    pub fn from_settings(
        api_key: Option<&str>,
        settings: &UpstreamSettings,
    ) -> Result<Self, BackendError> {
        let key = api_key.ok_or(BackendError::MissingCredential)?;
        Self::new(key, settings.clone())
    }

    /// Settings this backend was built with
    #[must_use]
    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.settings.base_url)
    }

    fn images_url(&self) -> String {
        format!("{}/v1/images/generations", self.settings.base_url)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageGenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// What one line of the upstream chat stream means
#[derive(Debug, PartialEq, Eq)]
enum ChunkLine {
    Content(String),
    Done,
    Error(String),
    Skip,
}

fn parse_chunk_line(line: &str) -> ChunkLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return ChunkLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return ChunkLine::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return ChunkLine::Error(
                    error
                        .message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| STREAM_ERROR_FALLBACK.to_string()),
                );
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta)
                .and_then(|d| d.content)
                .filter(|text| !text.is_empty())
                .map_or(ChunkLine::Skip, ChunkLine::Content)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unparseable upstream chunk");
            ChunkLine::Skip
        }
    }
}

/// Turn a non-success response into a `BackendError::Status`
async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("OpenAI returned {status}")
            } else {
                body
            }
        });
    BackendError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn stream_text(
        &self,
        request: &TextRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.settings.chat_model);
        let body = ChatCompletionBody {
            model,
            messages: [ChatMessage {
                role: "user",
                content: &request.message,
            }],
            stream: true,
        };

        let response = self
            .http_client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        tracing::debug!(model, "Upstream chat stream opened");

        let (tx, rx) = mpsc::channel(100);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut lines = LineBuffer::new();

            loop {
                let chunk = tokio::select! {
                    () = tx.closed() => {
                        tracing::debug!("Fragment receiver dropped, abandoning upstream stream");
                        return;
                    }
                    chunk = stream.next() => chunk,
                };

                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                        return;
                    }
                    None => break,
                };

                let batch = match lines.push(&bytes) {
                    Ok(batch) => batch,
                    Err(e) => {
                        let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                        return;
                    }
                };

                for line in batch {
                    match parse_chunk_line(&line) {
                        ChunkLine::Skip => {}
                        ChunkLine::Content(text) => {
                            if tx.send(StreamingToken::Token(text)).await.is_err() {
                                return;
                            }
                        }
                        ChunkLine::Done => {
                            let _ = tx.send(StreamingToken::Complete).await;
                            return;
                        }
                        ChunkLine::Error(message) => {
                            let _ = tx.send(StreamingToken::Error(message)).await;
                            return;
                        }
                    }
                }
            }

            // Connection closed without [DONE]
            let _ = tx.send(StreamingToken::Complete).await;
        });

        Ok(rx)
    }
}

#[async_trait]
impl ImageBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage, BackendError> {
        let body = ImageGenerationBody {
            model: &self.settings.image_model,
            prompt: &request.prompt,
            n: 1,
            size: &self.settings.image_size,
            quality: &self.settings.image_quality,
            response_format: "url",
        };

        let response = self
            .http_client
            .post(self.images_url())
            .bearer_auth(&self.api_key)
            .timeout(self.settings.request_timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await?;
        let parsed: ImagesResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let first = parsed.data.into_iter().next().ok_or(BackendError::NoImage)?;
        let url = first
            .url
            .filter(|u| !u.is_empty())
            .ok_or(BackendError::NoImage)?;

        Ok(GeneratedImage {
            url,
            revised_prompt: first.revised_prompt,
        })
    }
}
