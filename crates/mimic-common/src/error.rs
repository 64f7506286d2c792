//! Common error types for mimic.

use thiserror::Error;

/// Result type alias using mimic's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for mimic operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (stdio host channel, replay files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Offer/answer negotiation error
    #[error("signaling error: {0}")]
    Signaling(String),

    /// Peer connection transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Face inference collaborator error
    #[error("inference error: {0}")]
    Inference(String),

    /// Host bridge error
    #[error("bridge error: {0}")]
    Bridge(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a serialization error from any displayable type.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a signaling error from any displayable type.
    pub fn signaling(msg: impl std::fmt::Display) -> Self {
        Self::Signaling(msg.to_string())
    }

    /// Create a transport error from any displayable type.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create an inference error from any displayable type.
    pub fn inference(msg: impl std::fmt::Display) -> Self {
        Self::Inference(msg.to_string())
    }

    /// Create a bridge error from any displayable type.
    pub fn bridge(msg: impl std::fmt::Display) -> Self {
        Self::Bridge(msg.to_string())
    }

    /// Create an internal error from any displayable type.
    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
