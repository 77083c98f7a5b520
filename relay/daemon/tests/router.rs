//! Router tests
//!
//! Drive the full router in memory with `oneshot` and a scripted backend.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
};
use pretty_assertions::assert_eq;
use relay_core::{ErrorBody, ImageChatResponse, ScriptedBackend};
use relay_daemon::{router, AppState};
use tower::ServiceExt;

const TEXT_PATH: &str = "/functions/v1/chat-text";
const IMAGE_PATH: &str = "/functions/v1/chat-image";

fn state_with(backend: ScriptedBackend) -> AppState {
    let backend = Arc::new(backend);
    AppState::new()
        .with_text_backend(backend.clone())
        .with_image_backend(backend)
}

fn post(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn error_body(response: Response) -> ErrorBody {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn test_text_stream_frames_and_headers() {
    let backend = ScriptedBackend::new(["Hel", "lo", " there"]);
    let app = router(state_with(backend.clone()));

    let response = app.oneshot(post(TEXT_PATH, r#"{"message":"Hi"}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers[header::CONNECTION], "keep-alive");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "authorization, x-client-info, apikey, content-type"
    );

    assert_eq!(
        body_text(response).await,
        "data: {\"content\":\"Hel\"}\n\n\
         data: {\"content\":\"lo\"}\n\n\
         data: {\"content\":\" there\"}\n\n\
         data: [DONE]\n\n"
    );
    assert_eq!(backend.text_requests()[0].message, "Hi");
}

#[tokio::test]
async fn test_text_stream_mid_stream_error() {
    let app = router(state_with(
        ScriptedBackend::new(["a", "b", "c"]).failing_after(2, "upstream overloaded"),
    ));

    let response = app.oneshot(post(TEXT_PATH, r#"{"message":"Hi"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert_eq!(
        body,
        "data: {\"content\":\"a\"}\n\n\
         data: {\"content\":\"b\"}\n\n\
         data: {\"error\":\"upstream overloaded\"}\n\n"
    );
    assert!(!body.contains("[DONE]"));
}

#[tokio::test]
async fn test_text_upstream_failure_before_stream_is_json() {
    let app = router(state_with(
        ScriptedBackend::new(["never"]).failing_before_stream("Incorrect API key provided"),
    ));

    let response = app.oneshot(post(TEXT_PATH, r#"{"message":"Hi"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(response).await,
        ErrorBody::new("Incorrect API key provided")
    );
}

#[tokio::test]
async fn test_text_validation_failures() {
    let cases = [
        ("{oops", "Invalid JSON in request body"),
        ("null", "Missing request body"),
        (r#"{"message":42}"#, "Message must be a string"),
        (r#"{"other":"x"}"#, "Message must be a string"),
        (r#"{"message":"  \n"}"#, "Message must not be empty"),
    ];

    for (body, expected) in cases {
        let backend = ScriptedBackend::new(["x"]);
        let app = router(state_with(backend.clone()));
        let response = app.oneshot(post(TEXT_PATH, body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert_eq!(error_body(response).await.error, expected, "body {body}");
        assert!(backend.text_requests().is_empty(), "no upstream call for {body}");
    }
}

#[tokio::test]
async fn test_wrong_method_rejected() {
    let app = router(state_with(ScriptedBackend::new(["x"])));
    let request = Request::builder()
        .method(Method::GET)
        .uri(TEXT_PATH)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(response).await.error, "Method GET not allowed");
}

#[tokio::test]
async fn test_options_answered_first() {
    // Even an invalid body and no backend: OPTIONS always succeeds
    let app = router(AppState::new().with_access_token("secret"));
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri(IMAGE_PATH)
        .body(Body::from("{garbage"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn test_missing_credential() {
    let app = router(AppState::new());

    let response = app
        .clone()
        .oneshot(post(TEXT_PATH, r#"{"message":"Hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(response).await.error,
        "OpenAI API key not configured"
    );

    let response = app
        .oneshot(post(IMAGE_PATH, r#"{"prompt":"a cat"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(response).await.error,
        "OpenAI API key not configured"
    );
}

#[tokio::test]
async fn test_image_success() {
    let backend = ScriptedBackend::default().with_image("https://img.example/cat.png");
    let app = router(state_with(backend.clone()));

    let response = app
        .oneshot(post(IMAGE_PATH, r#"{"prompt":"a cat"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let reply: ImageChatResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
        reply,
        ImageChatResponse::new("https://img.example/cat.png", "a cat")
    );
    assert_eq!(backend.image_requests()[0].prompt, "a cat");
}

#[tokio::test]
async fn test_image_failure() {
    let app = router(state_with(ScriptedBackend::default()));

    let response = app
        .oneshot(post(IMAGE_PATH, r#"{"prompt":"a cat"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(response).await,
        ErrorBody::new("No image URL returned from OpenAI")
    );
}

#[tokio::test]
async fn test_image_prompt_validation() {
    let app = router(state_with(ScriptedBackend::default().with_image("u")));
    let response = app.oneshot(post(IMAGE_PATH, r#"{"prompt":""}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(response).await.error, "Prompt must not be empty");
}

#[tokio::test]
async fn test_bearer_check() {
    let app = router(state_with(ScriptedBackend::new(["ok"])).with_access_token("secret"));

    let response = app
        .clone()
        .oneshot(post(TEXT_PATH, r#"{"message":"Hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        error_body(response).await.error,
        "Missing Authorization header"
    );

    let mut wrong = post(TEXT_PATH, r#"{"message":"Hi"}"#);
    wrong
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
    let response = app.clone().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut right = post(TEXT_PATH, r#"{"message":"Hi"}"#);
    right
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
    let response = app.oneshot(right).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn test_health_is_open() {
    let app = router(AppState::new().with_access_token("secret"));
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}
