//! Relay Core - Streaming Chat Protocol for chat-relay
//!
//! This crate holds everything the relay daemon and its clients agree on:
//! the line-oriented event frame format, the client-side reassembly state
//! machine, request/response bodies, the conversation log the client mutates,
//! and the upstream generation backends the daemon streams from.
//!
//! # Architecture
//!
//! ```text
//!   chat client                          relay daemon                 upstream
//! ┌──────────────────┐   POST {message}  ┌──────────────────┐  stream  ┌──────────┐
//! │  ChatClient      │ ────────────────► │  chat-text       │ ───────► │ OpenAI   │
//! │  ┌────────────┐  │                   │  produce_frames  │ ◄─────── │ chat     │
//! │  │FrameDecoder│  │ ◄──────────────── │  Frame::encode   │ fragments└──────────┘
//! │  └─────┬──────┘  │  data: {...}\n\n  └──────────────────┘
//! │        ▼         │  data: [DONE]\n\n
//! │  Conversation    │
//! └──────────────────┘
//! ```
//!
//! # Module Overview
//!
//! - [`wire`]: frame encoding, chunk reassembly, and JSON bodies
//! - [`conversation`]: the client's in-memory conversation log
//! - [`backend`]: upstream text/image generation (OpenAI, scripted)
//! - [`config`]: TOML configuration with environment overrides

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod wire;

pub use backend::{
    BackendError, GeneratedImage, ImageBackend, ImageRequest, OpenAiBackend, StreamingToken,
    TextBackend, TextRequest,
};
#[cfg(any(test, feature = "test-utils"))]
pub use backend::ScriptedBackend;
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env,
    ClientSettings, ConfigError, ConfigOverrides, ConfigSource, RelayConfig, RelayToml,
    ServerSettings, UpstreamSettings,
};
pub use conversation::{
    Conversation, ConversationEntry, ConversationError, EntryId, EntryKind, Role,
    IMAGE_PLACEHOLDER,
};
pub use wire::{
    DecodedLine, ErrorBody, Frame, FrameDecoder, ImageChatReply, ImageChatRequest,
    ImageChatResponse, LineBuffer, TextChatRequest, WireError, STREAM_ERROR_FALLBACK,
};
