//! Error types for the streaming client

use thiserror::Error;

/// Streaming-client error type
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Payload error ({kind}): {message}")]
    Payload { kind: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stream client is not running")]
    ClientStopped,

    #[error("Command queue full ({capacity} pending) before the client started")]
    CommandQueueFull { capacity: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StreamError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        StreamError::MalformedFrame(msg.into())
    }

    pub fn payload(kind: impl Into<String>, message: impl Into<String>) -> Self {
        StreamError::Payload {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        StreamError::Config(msg.into())
    }
}

/// Result type alias for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;
