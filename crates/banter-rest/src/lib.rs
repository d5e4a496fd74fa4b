//! REST client for the banter Discord client.
//!
//! A thin wrapper over HTTP whose only interesting contract is the rate
//! limiter's: every request acquires its route bucket, releases it with the
//! response headers, sleeps out 429s with the server-supplied delay, and
//! retries transient failures with exponential backoff.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod endpoints;
mod error;

pub use client::*;
pub use error::*;
