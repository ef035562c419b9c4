//! Unified error type.

use std::time::Duration;

/// The error type returned by kite's fallible operations.
///
/// Client-facing failures (404, 401, 429, etc.) are written to the response,
/// not returned as `Error`s. This type surfaces configuration mistakes caught
/// at registration time and infrastructure failures while serving.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route `{pattern}` conflicts with an existing route: {reason}")]
    ConflictingRoute { pattern: String, reason: String },

    #[error("duplicate route name `{0}`")]
    DuplicateRouteName(String),

    #[error("invalid middleware configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("server is not running")]
    NotRunning,

    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("expected content type `{expected}`")]
    UnsupportedMediaType { expected: &'static str },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("urlencoded: {0}")]
    UrlEncoded(#[from] serde_urlencoded::de::Error),

    #[error("request body: {0}")]
    Body(#[from] hyper::Error),

    #[error("secure cookie: {0}")]
    SecureCookie(&'static str),

    #[error("handler fault: {0}")]
    HandlerFault(String),
}

impl Error {
    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern { pattern: pattern.to_owned(), reason: reason.into() }
    }

    pub(crate) fn conflict(pattern: &str, reason: impl Into<String>) -> Self {
        Self::ConflictingRoute { pattern: pattern.to_owned(), reason: reason.into() }
    }
}
