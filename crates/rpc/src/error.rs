//! Error model of the session layer.

use thiserror::Error;

/// Result type used across the session layer.
pub type RpcResult<T> = Result<T, RpcError>;

/// The channel itself became unusable mid-call.
///
/// These are the only failures that trigger a reconnect-and-replay.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// The channel was closed (locally or by the peer) before the call was issued.
    #[error("channel closed")]
    ChannelClosed,

    /// The stream ended while a response was outstanding.
    #[error("unexpected end of stream")]
    UnexpectedEof,
}

/// Session-layer error.
///
/// Only [`RpcError::Connectivity`] is recovered inside the call layer; every
/// other variant reaches the caller exactly as it was produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The session was shut down. Terminal: never retried.
    #[error("session closed")]
    Closed,

    #[error("connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),

    /// The endpoint address can never be dialed (unknown scheme, malformed).
    /// Permanent: reported before the retry loop and never retried.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The transport could not be established.
    #[error("dial {endpoint} failed: {reason}")]
    Dial { endpoint: String, reason: String },

    /// The remote side rejected the call.
    #[error("remote error ({code}): {message}")]
    Application { code: i64, message: String },

    #[error("encode request: {0}")]
    Encode(String),

    #[error("decode response: {0}")]
    Decode(String),

    /// Reading the local artifact source failed (nothing was sent).
    #[error("read artifact: {0}")]
    Io(String),
}

impl RpcError {
    pub fn dial(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Dial {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn application(code: i64, message: impl Into<String>) -> Self {
        Self::Application {
            code,
            message: message.into(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, RpcError::Connectivity(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, RpcError::Closed)
    }

    /// Errors that end a retry loop at once: another dial cannot change the outcome.
    pub fn is_permanent(&self) -> bool {
        matches!(self, RpcError::Closed | RpcError::InvalidEndpoint { .. })
    }
}
