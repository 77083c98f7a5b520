//! Generation Backend Traits
//!
//! The relay daemon talks to upstream generation services through these two
//! traits, so request handling never depends on a particular provider.
//!
//! - [`TextBackend`] streams chat fragments over an mpsc channel
//! - [`ImageBackend`] produces one generated image per request

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Fragment events from a streaming text backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A fragment of generated text
    Token(String),
    /// Upstream finished normally
    Complete,
    /// Upstream failed after the stream opened
    Error(String),
}

/// A single-turn chat request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextRequest {
    /// The user's message
    pub message: String,
    /// Model override (backend default when unset)
    pub model: Option<String>,
}

impl TextRequest {
    /// Create a request for `message`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: None,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// An image generation request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRequest {
    /// Description of the image
    pub prompt: String,
}

impl ImageRequest {
    /// Create a request for `prompt`
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Result of a successful image generation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Location of the image
    pub url: String,
    /// Prompt as rewritten by the provider, if it reports one
    pub revised_prompt: Option<String>,
}

/// Errors raised before or while talking to an upstream service
#[derive(Debug, Error)]
pub enum BackendError {
    /// No API key was configured
    #[error("OpenAI API key not configured")]
    MissingCredential,

    /// Transport failure
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("{message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Provider's error message, or the raw body
        message: String,
    },

    /// Upstream answered with something we could not interpret
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// Image generation succeeded but carried no URL
    #[error("No image URL returned from OpenAI")]
    NoImage,
}

/// Streaming text generation
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Open a fragment stream for `request`
    ///
    /// Failures before the stream opens are returned as `Err`. Once the
    /// receiver is handed back, failures arrive as [`StreamingToken::Error`].
    /// Dropping the receiver tells the backend to stop.
    async fn stream_text(
        &self,
        request: &TextRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError>;
}

/// One-shot image generation
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Generate one image for `request`
    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage, BackendError>;
}
