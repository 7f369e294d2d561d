//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Persisted config missing or unreadable. Recovered locally, never fatal.
    #[error("config error: {0}")]
    Config(String),

    /// Login rejected or malformed login response. The message is user-facing.
    #[error("{0}")]
    Auth(String),

    /// Socket-level failure: connect error, timeout, mid-session drop.
    #[error("transport error: {0}")]
    Transport(String),

    /// Template fetch or view initializer failure during navigation.
    #[error("view error: {0}")]
    View(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;
