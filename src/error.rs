//! Error types

use thiserror::Error;

/// Reasons the agent does not augment the current page
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("page is not supported")]
    Unsupported,

    #[error("CSRF token was not found")]
    TokenMissing,

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failures talking to the platform endpoint
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network response was not ok: {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}
