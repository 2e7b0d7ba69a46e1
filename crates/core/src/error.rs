//! Data model error type.

use thiserror::Error;

/// Result type used across the data model.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while interpreting wire values.
///
/// Keep this focused on decoding/validation of payloads. Connectivity and
/// remote failures belong to the RPC layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A log line carried a kind code this version does not know.
    #[error("unknown line kind: {0}")]
    UnknownLineKind(i32),

    /// The opaque backend configuration could not be decoded into the requested shape.
    #[error("invalid backend config: {0}")]
    InvalidConfig(String),
}

impl ModelError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
