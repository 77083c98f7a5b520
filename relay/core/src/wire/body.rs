//! JSON request and response bodies for the two chat endpoints.

use serde::{Deserialize, Serialize};

/// Body of a `chat-text` request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChatRequest {
    /// The user's message
    pub message: String,
}

/// Body of a `chat-image` request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageChatRequest {
    /// Description of the image to generate
    pub prompt: String,
}

/// Successful `chat-image` response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageChatResponse {
    /// Always `true`
    pub success: bool,
    /// Location of the generated image
    pub image_url: String,
    /// The prompt the image was generated from
    pub prompt: String,
}

impl ImageChatResponse {
    /// Build a successful response
    pub fn new(image_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            success: true,
            image_url: image_url.into(),
            prompt: prompt.into(),
        }
    }
}

/// Non-streamed error body returned by either endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `false`
    pub success: bool,
    /// Human-readable failure description
    pub error: String,
}

impl ErrorBody {
    /// Build an error body
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Either shape a `chat-image` response can take
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ImageChatReply {
    /// `{success: true, imageUrl, prompt}`
    Success(ImageChatResponse),
    /// `{success: false, error}`
    Failure(ErrorBody),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_response_uses_camel_case() {
        let json = serde_json::to_value(ImageChatResponse::new("https://img/1.png", "a cat")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "imageUrl": "https://img/1.png",
                "prompt": "a cat",
            })
        );
    }

    #[test]
    fn test_error_body_shape() {
        let json = serde_json::to_value(ErrorBody::new("Method GET not allowed")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "Method GET not allowed" })
        );
    }

    #[test]
    fn test_reply_distinguishes_shapes() {
        let ok: ImageChatReply = serde_json::from_str(
            r#"{"success":true,"imageUrl":"https://img/2.png","prompt":"dog"}"#,
        )
        .unwrap();
        assert!(matches!(ok, ImageChatReply::Success(r) if r.image_url == "https://img/2.png"));

        let err: ImageChatReply =
            serde_json::from_str(r#"{"success":false,"error":"No image URL returned from OpenAI"}"#)
                .unwrap();
        assert!(matches!(err, ImageChatReply::Failure(e) if e.error.contains("No image URL")));
    }
}
