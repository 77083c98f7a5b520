//! Chat Client - Stream Consumer for chat-relay
//!
//! Sends one message at a time to the relay and applies the streamed reply
//! to an in-memory conversation log as it arrives.
//!
//! # Module Overview
//!
//! - [`client`]: [`ChatClient`], the busy flag and turn lifecycle
//! - [`consumer`]: body reassembly via `relay_core::FrameDecoder`
//! - [`transport`]: the [`ChatTransport`] seam and its HTTP implementation
//! - [`render`]: terminal formatting
//!
//! # Usage
//!
//! ```ignore
//! use chat_client::{ChatClient, HttpTransport};
//!
//! let transport = HttpTransport::new(&config.client)?;
//! let mut client = ChatClient::new(transport);
//! client.send_text("Hello!");
//! while let Some(update) = client.next_update().await {
//!     print!("{}", chat_client::render::render_update(&update));
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod consumer;
pub mod error;
pub mod render;
pub mod transport;

pub use client::{image_caption, ChatClient, IgnoreReason, SendOutcome, Update};
pub use consumer::{consume_stream, TurnEnd, TurnEvent};
pub use error::ClientError;
pub use transport::{ByteStream, ChatTransport, HttpTransport};
