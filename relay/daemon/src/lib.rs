//! Relay Daemon
//!
//! HTTP server in front of the upstream generation backends.
//!
//! # Routes
//!
//! | Route | Behavior |
//! |---|---|
//! | `/functions/v1/chat-text` | `POST {message}` → `text/event-stream` of wire frames |
//! | `/functions/v1/chat-image` | `POST {prompt}` → `{success, imageUrl, prompt}` |
//! | `/health` | `GET` → `OK` |
//!
//! Validation and upstream failures before a stream opens come back as a
//! single `400 {success: false, error}`. Once a stream is open, failures
//! arrive as one error frame.
//!
//! Each request owns its upstream subscription and frame channel; there is
//! no state shared between requests beyond the read-only [`AppState`].

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod producer;

use std::future::Future;
use std::sync::Arc;

use axum::{
    http::header,
    routing::{any, get},
    Router,
};
use relay_core::{BackendError, ImageBackend, OpenAiBackend, RelayConfig, TextBackend};
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;

pub use error::ApiError;
pub use producer::{produce_frames, ProduceOutcome};

/// Shared, read-only handler state
#[derive(Clone, Default)]
pub struct AppState {
    text: Option<Arc<dyn TextBackend>>,
    image: Option<Arc<dyn ImageBackend>>,
    access_token: Option<Arc<str>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("text", &self.text.as_ref().map(|b| b.name().to_string()))
            .field("image", &self.image.as_ref().map(|b| b.name().to_string()))
            .field("access_token", &self.access_token.is_some())
            .finish()
    }
}

impl AppState {
    /// State with no backends and no bearer check
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state from resolved configuration
    ///
    /// Without an API key the daemon still starts; every chat request then
    /// fails with `OpenAI API key not configured`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn from_config(config: &RelayConfig) -> Result<Self, BackendError> {
        let mut state = Self::new();
        if let Some(ref token) = config.server.access_token {
            state = state.with_access_token(token.clone());
        }

        match config.server.api_key.as_deref() {
            Some(key) => {
                let backend = Arc::new(OpenAiBackend::new(key, config.upstream.clone())?);
                state = state
                    .with_text_backend(backend.clone())
                    .with_image_backend(backend);
            }
            None => {
                tracing::warn!("OPENAI_API_KEY is not set; chat requests will be rejected");
            }
        }
        Ok(state)
    }

    /// Use `backend` for `chat-text`
    #[must_use]
    pub fn with_text_backend(mut self, backend: Arc<dyn TextBackend>) -> Self {
        self.text = Some(backend);
        self
    }

    /// Use `backend` for `chat-image`
    #[must_use]
    pub fn with_image_backend(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.image = Some(backend);
        self
    }

    /// Require `Authorization: Bearer <token>` on chat requests
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token: String = token.into();
        self.access_token = Some(Arc::from(token));
        self
    }

    /// Text backend, if configured
    #[must_use]
    pub fn text_backend(&self) -> Option<Arc<dyn TextBackend>> {
        self.text.clone()
    }

    /// Image backend, if configured
    #[must_use]
    pub fn image_backend(&self) -> Option<Arc<dyn ImageBackend>> {
        self.image.clone()
    }

    /// Expected bearer token, if any
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

/// Build the daemon router
pub fn router(state: AppState) -> Router {
    let functions = Router::new()
        .route("/chat-text", any(handlers::chat_text))
        .route("/chat-image", any(handlers::chat_image))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/functions/v1", functions)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            middleware::allowed_headers_value(),
        ))
        .layer(middleware::cors_layer())
        .layer(axum::middleware::from_fn(middleware::request_span))
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves
///
/// # Errors
///
/// Returns the listener's I/O error if serving fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
