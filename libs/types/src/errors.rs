//! Return codes and parse errors shared across crates

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use thiserror::Error;

/// Numeric outcome of an engine operation, as exposed to façade layers.
///
/// The engine itself reports failures through typed errors; every error
/// maps onto exactly one of these codes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
pub enum ReturnCode {
    NoError = 0,
    InitFailure = 1,
    InvalidConfiguration = 2,
    MessageNotFound = 3,
    MessageInvalidSize = 4,
    MessageQueueFull = 5,
    /// First code reserved for transport and framing failures
    ImplementationSpecific = 1000,
}

impl ReturnCode {
    pub const fn is_ok(self) -> bool {
        matches!(self, ReturnCode::NoError)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReturnCode::NoError => "no error",
            ReturnCode::InitFailure => "initialization failure",
            ReturnCode::InvalidConfiguration => "invalid configuration",
            ReturnCode::MessageNotFound => "message not found",
            ReturnCode::MessageInvalidSize => "invalid message size",
            ReturnCode::MessageQueueFull => "message queue full",
            ReturnCode::ImplementationSpecific => "implementation specific error",
        };
        write!(f, "{} ({})", text, u32::from(*self))
    }
}

/// A textual enum value that does not name any variant
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownValue {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
