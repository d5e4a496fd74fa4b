//! REST error types.

use std::time::Duration;

use banter_ratelimit::RateLimitError;
use thiserror::Error;

/// REST client errors.
#[derive(Debug, Error)]
pub enum RestError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The API returned a non-success status.
    #[error("API error {status} (code {api_code}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Discord error code from the error envelope, or 0.
        api_code: i64,
        /// Human-readable message.
        message: String,
    },

    /// Rate limited and out of retries.
    #[error("rate limited on {bucket}, retry after {retry_after}s")]
    RateLimited {
        /// Seconds the server asked us to wait.
        retry_after: f64,
        /// Bucket that limited us.
        bucket: String,
    },

    /// A rate limit header failed to parse.
    #[error(transparent)]
    RateLimitHeader(#[from] RateLimitError),
}

impl RestError {
    /// Whether retrying the request could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Json(_) | Self::RateLimitHeader(_) => false,
        }
    }

    /// Server-suggested retry delay, when one exists.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => {
                Some(Duration::from_secs_f64(retry_after.clamp(0.0, 3600.0)))
            }
            _ => None,
        }
    }
}

/// Result type for REST operations.
pub type RestResult<T> = Result<T, RestError>;
