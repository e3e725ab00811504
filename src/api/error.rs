//! Error taxonomy for Business Central API calls
//!
//! Every failure surfaced by the token provider or the HTTP client maps onto
//! one of these variants so callers can tell transient failures (already
//! retried) from terminal ones.

use std::time::Duration;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Token exchange failed: network error, non-200 status or malformed body
    #[error("authentication failed: {0}")]
    Auth(String),

    /// DNS, connect, timeout and other transport-level failures
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limit exceeded (429), retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("server error: {status} - {body}")]
    Server { status: u16, body: String },

    /// 4xx other than 401 and 429, never retried
    #[error("client error: {status} - {body}")]
    Client { status: u16, body: String },

    /// 401 that survived a token refresh and replay
    #[error("unauthorized (401) after token refresh: {body}")]
    Unauthorized { body: String },

    #[error("max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<ApiError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Query options that cannot form a request
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl ApiError {
    /// Whether the retry loop should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_) | ApiError::RateLimited { .. } | ApiError::Server { .. }
        )
    }

    /// HTTP status carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::MaxRetriesExceeded { source, .. } => source.status_code(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}
