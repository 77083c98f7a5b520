//! Endpoint handlers
//!
//! Both chat endpoints are mounted with `any(...)` so that method checks and
//! CORS preflight happen here, in the order clients rely on:
//!
//! 1. `OPTIONS` answers 200 with an empty body
//! 2. anything but `POST` is `Method <M> not allowed`
//! 3. body parsing and field validation
//! 4. upstream credential presence
//! 5. the upstream call itself

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use relay_core::{BackendError, ImageChatResponse, ImageRequest, TextRequest};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn, Instrument};

use crate::error::ApiError;
use crate::producer::{produce_frames, ProduceOutcome};
use crate::AppState;

/// Frames buffered between the producer task and the response body
const BODY_CHANNEL_CAPACITY: usize = 32;

/// Which JSON field an endpoint reads
#[derive(Clone, Copy)]
enum InputField {
    Message,
    Prompt,
}

impl InputField {
    fn key(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Prompt => "prompt",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Message => "Message",
            Self::Prompt => "Prompt",
        }
    }
}

fn require_post(method: &Method) -> Result<(), ApiError> {
    if *method == Method::POST {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Method {method} not allowed")))
    }
}

/// Pull a non-empty string field out of a JSON body
fn parse_input(body: &[u8], field: InputField) -> Result<String, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request("Invalid JSON in request body"))?;

    if value.is_null() {
        return Err(ApiError::bad_request("Missing request body"));
    }

    let Some(text) = value.get(field.key()).and_then(serde_json::Value::as_str) else {
        return Err(ApiError::bad_request(format!(
            "{} must be a string",
            field.label()
        )));
    };

    if text.trim().is_empty() {
        return Err(ApiError::bad_request(format!(
            "{} must not be empty",
            field.label()
        )));
    }

    Ok(text.to_string())
}

fn preflight() -> Response {
    StatusCode::OK.into_response()
}

/// `POST /functions/v1/chat-text`
///
/// Streams the upstream reply as `text/event-stream`.
pub async fn chat_text(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Response, ApiError> {
    if method == Method::OPTIONS {
        return Ok(preflight());
    }
    require_post(&method)?;
    let message = parse_input(&body, InputField::Message)?;

    let backend = state
        .text_backend()
        .ok_or(BackendError::MissingCredential)?;

    let upstream = backend.stream_text(&TextRequest::new(message)).await?;
    info!(backend = backend.name(), "Text stream opened");

    let (body_tx, body_rx) = mpsc::channel::<Bytes>(BODY_CHANNEL_CAPACITY);
    tokio::spawn(
        async move {
            match produce_frames(upstream, body_tx).await {
                ProduceOutcome::Completed { fragments } => {
                    info!(fragments, "Text stream completed");
                }
                ProduceOutcome::Failed { fragments, message } => {
                    warn!(fragments, error = %message, "Text stream failed");
                }
                ProduceOutcome::ClientGone { fragments } => {
                    info!(fragments, "Text stream abandoned by client");
                }
            }
        }
        .in_current_span(),
    );

    let stream = ReceiverStream::new(body_rx).map(Ok::<_, Infallible>);

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// `POST /functions/v1/chat-image`
///
/// Returns `{success, imageUrl, prompt}` once the image exists.
pub async fn chat_image(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Response, ApiError> {
    if method == Method::OPTIONS {
        return Ok(preflight());
    }
    require_post(&method)?;
    let prompt = parse_input(&body, InputField::Prompt)?;

    let backend = state
        .image_backend()
        .ok_or(BackendError::MissingCredential)?;

    let image = backend
        .generate_image(&ImageRequest::new(prompt.clone()))
        .await?;
    info!(backend = backend.name(), "Image generated");

    Ok(Json(ImageChatResponse::new(image.url, prompt)).into_response())
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}
