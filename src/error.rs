//! Error types for the PhOS core.
//!

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhosError {
    /// Missing or insufficient parent handles, or a malformed request
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    /// The underlying device runtime call failed
    #[error("Driver error: {call} returned {code}")]
    DriverError { call: String, code: i32 },
    #[error("Not found: {0}")]
    NotFound(String),
    /// Pooling or byte capture is not available for a resource kind
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    /// Wiring bug between stages (unregistered handler, unknown command type)
    #[error("Protocol defect: {0}")]
    ProtocolDefect(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PhosError {
    /// Protocol defects halt the affected pipeline, everything else is reported to the caller
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolDefect(_))
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn protocol_defect(msg: impl Into<String>) -> Self {
        Self::ProtocolDefect(msg.into())
    }
}

impl From<std::io::Error> for PhosError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for PhosError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("record serialization failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, PhosError>;
