//! Protocol-level errors for frame and command processing
//!
//! Provides error handling for the skybus wire codec, including enough
//! context to diagnose a bad frame from a log line alone. Each variant says
//! what went wrong and what was expected.

use thiserror::Error;

/// Codec errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Declared payload exceeds what the receiver can hold
    #[error("Payload too large: {size} bytes exceeds limit {limit} (context: {context})")]
    PayloadTooLarge {
        size: usize,
        limit: usize,
        context: String,
    },

    /// Instrumentation command id is not part of the command set
    #[error("Unknown instrumentation command id {command_id}")]
    UnknownCommand { command_id: u32 },

    /// A response arrived with the wrong command id
    #[error("Unexpected instrumentation command: expected {expected}, got {got}")]
    UnexpectedCommand { expected: u32, got: u32 },

    /// Secondary id inside a command body is out of range
    #[error("Unknown {field} {value} in command {command_id}")]
    UnknownSubCommand {
        command_id: u32,
        field: &'static str,
        value: u32,
    },

    /// String field is too long or not valid UTF-8
    #[error("Invalid string field: {reason}")]
    InvalidString { reason: String },

    /// ARINC 429 label or SDI text is malformed
    #[error("Invalid A429 label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    /// `ip:port` text is malformed
    #[error("Invalid address '{value}': expected ip:port")]
    InvalidAddress { value: String },
}

impl ProtocolError {
    /// Create MessageTooSmall error with diagnostic context
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    /// Create PayloadTooLarge error with diagnostic context
    pub fn payload_too_large(size: usize, limit: usize, context: impl Into<String>) -> Self {
        Self::PayloadTooLarge {
            size,
            limit,
            context: context.into(),
        }
    }

    pub fn invalid_string(reason: impl Into<String>) -> Self {
        Self::InvalidString {
            reason: reason.into(),
        }
    }

    pub fn invalid_label(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLabel {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// True when the error means "not enough bytes yet" rather than corruption
    pub fn is_truncation(&self) -> bool {
        matches!(self, ProtocolError::MessageTooSmall { .. })
    }
}

/// Result type for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = ProtocolError::message_too_small(20, 7, "frame header");
        assert_eq!(
            err.to_string(),
            "Message too small: need 20 bytes, got 7 (context: frame header)"
        );
        assert!(err.is_truncation());

        let err = ProtocolError::payload_too_large(512, 192, "instrumentation frame");
        assert!(err.to_string().contains("512 bytes exceeds limit 192"));
        assert!(!err.is_truncation());
    }
}
