//! Relay transport
//!
//! [`ChatTransport`] is the seam between the turn logic and the network.
//! [`HttpTransport`] is the real implementation; tests substitute in-memory
//! byte streams.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use relay_core::{ClientSettings, ErrorBody, ImageChatReply, ImageChatRequest, TextChatRequest};

use crate::error::ClientError;

/// Raw response body, chunked however the network delivers it
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How the client reaches the relay
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a text turn and return the live response body
    ///
    /// A non-streamed error response is returned as `Err`.
    async fn open_text_stream(&self, message: &str) -> Result<ByteStream, ClientError>;

    /// Request one image and wait for the full reply
    async fn request_image(&self, prompt: &str) -> Result<ImageChatReply, ClientError>;
}

/// HTTP transport using reqwest
#[derive(Clone, Debug)]
pub struct HttpTransport {
    endpoint: String,
    token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for `settings.endpoint`
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            http_client,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post(&self, function: &str) -> reqwest::RequestBuilder {
        let request = self
            .http_client
            .post(format!("{}/{function}", self.endpoint));
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Read a non-success response into `ClientError::Status`
async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                format!("Relay returned {status}")
            } else {
                body
            }
        });
    ClientError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_text_stream(&self, message: &str) -> Result<ByteStream, ClientError> {
        let response = self
            .post("chat-text")
            .json(&TextChatRequest {
                message: message.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        tracing::debug!(status = %response.status(), "Text stream opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }

    async fn request_image(&self, prompt: &str) -> Result<ImageChatReply, ClientError> {
        let response = self
            .post("chat-image")
            .json(&ImageChatRequest {
                prompt: prompt.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ImageChatReply>(&body) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(ClientError::Status {
                status: status.as_u16(),
                message: if body.trim().is_empty() {
                    format!("Relay returned {status}")
                } else {
                    body
                },
            }),
            Err(e) => Err(ClientError::Decode(e.to_string())),
        }
    }
}
