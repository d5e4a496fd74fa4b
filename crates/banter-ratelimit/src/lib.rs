//! Per-route rate limiting for the banter Discord client.
//!
//! Discord scopes REST rate limits to route "buckets" (a route template
//! with its major parameter substituted) plus one account-wide global
//! limit. This crate serializes requests per bucket, paces them from the
//! `X-RateLimit-*` response headers, and honors global lockouts across
//! every bucket.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use banter_ratelimit::RateLimiter;
//!
//! let limiter = RateLimiter::new();
//! let guard = limiter.acquire("/channels/1/messages").await;
//! // ... perform the HTTP request ...
//! guard.release(Some(&response_headers))?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod bucket;
mod headers;

pub use bucket::*;
pub use headers::*;

use thiserror::Error;

/// Rate limiter errors.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// A rate limit header failed to parse.
    #[error("invalid rate limit header {header}: {value:?}")]
    InvalidHeader {
        /// Lowercase header name.
        header: String,
        /// Raw header value.
        value: String,
    },
}

/// Result type for rate limiter operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;
