//! Client error types

use std::time::Duration;

use relay_core::WireError;
use thiserror::Error;

/// Errors raised while talking to the relay
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection or body read failure
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// The relay answered with a non-streamed error
    #[error("{message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// The relay's `error` field, or the raw body
        message: String,
    },

    /// The relay answered with something unreadable
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Frame reassembly failed
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The turn exceeded its time limit
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}
