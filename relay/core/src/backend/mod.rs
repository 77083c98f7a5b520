//! Upstream Generation Backends
//!
//! Abstracted access to the services that actually generate text and images,
//! through a common trait interface.
//!
//! # Available Backends
//!
//! - **OpenAI**: chat completions and image generation (default)
//! - **Scripted**: deterministic playback for tests (`test-utils` feature)
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::backend::{OpenAiBackend, TextBackend, TextRequest};
//!
//! let backend = OpenAiBackend::new(api_key, settings)?;
//! let mut rx = backend.stream_text(&TextRequest::new("Hello!")).await?;
//! ```

mod openai;
#[cfg(any(test, feature = "test-utils"))]
mod scripted;
mod traits;

pub use openai::OpenAiBackend;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedBackend;
pub use traits::{
    BackendError, GeneratedImage, ImageBackend, ImageRequest, StreamingToken, TextBackend,
    TextRequest,
};
