//! Request middleware: request spans, bearer check, CORS

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Headers browsers may send on chat requests
pub const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// Run each request inside a span carrying a fresh request id
pub async fn request_span(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    next.run(request).instrument(span).await
}

/// Reject requests without the configured bearer token
///
/// Preflight requests always pass. With no token configured every request
/// passes.
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.access_token() else {
        return next.run(request).await;
    };
    if *request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let Some(value) = request.headers().get(header::AUTHORIZATION) else {
        return ApiError::unauthorized("Missing Authorization header").into_response();
    };
    let Ok(header_value) = value.to_str() else {
        return ApiError::unauthorized("Invalid Authorization header").into_response();
    };

    let token = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
    if token != expected {
        tracing::warn!("Rejected request with wrong bearer token");
        return ApiError::unauthorized("Invalid access token").into_response();
    }

    next.run(request).await
}

/// CORS layer answering browser preflights and allowing any origin
pub fn cors_layer() -> CorsLayer {
    let headers: Vec<HeaderName> = ALLOWED_HEADERS
        .split(", ")
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list(headers))
}

/// Value for `Access-Control-Allow-Headers` on non-preflight responses
pub fn allowed_headers_value() -> HeaderValue {
    HeaderValue::from_static(ALLOWED_HEADERS)
}
