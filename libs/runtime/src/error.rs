//! Engine Error Types
//!
//! Every failure the engine reports falls into one of the categories a
//! façade needs to tell apart: bad configuration, failed initialization,
//! size mismatch, full queue, unknown message, or a transport/framing
//! problem underneath. Each maps to one [`ReturnCode`].

use codec::ProtocolError;
use network::TransportError;
use thiserror::Error;
use types::ReturnCode;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    /// Operation not allowed for this message or context configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Context construction or registration failed
    #[error("Initialization error: {message}")]
    Initialization { message: String },

    #[error("Invalid size for message {message_name}: expected {expected} bytes, got {actual}")]
    InvalidSize {
        message_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Queue of message {message_name} is full ({depth} entries)")]
    QueueFull { message_name: String, depth: usize },

    #[error("Message not found: {name}")]
    MessageNotFound { name: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    pub fn invalid_size(message_name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::InvalidSize {
            message_name: message_name.into(),
            expected,
            actual,
        }
    }

    pub fn queue_full(message_name: impl Into<String>, depth: usize) -> Self {
        Self::QueueFull {
            message_name: message_name.into(),
            depth,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::MessageNotFound { name: name.into() }
    }

    /// Numeric code exposed to façade layers
    pub fn return_code(&self) -> ReturnCode {
        match self {
            EngineError::Configuration { .. } => ReturnCode::InvalidConfiguration,
            EngineError::Initialization { .. } => ReturnCode::InitFailure,
            EngineError::InvalidSize { .. } => ReturnCode::MessageInvalidSize,
            EngineError::QueueFull { .. } => ReturnCode::MessageQueueFull,
            EngineError::MessageNotFound { .. } => ReturnCode::MessageNotFound,
            EngineError::Transport(_) | EngineError::Protocol(_) => {
                ReturnCode::ImplementationSpecific
            }
        }
    }
}
