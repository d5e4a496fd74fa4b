//! Rate limit header parsing.
//!
//! Discord paces clients through `X-RateLimit-*` response headers. The
//! parser works over a lowercase string map so it stays independent of any
//! particular HTTP client.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::RateLimitError;

/// Parsed rate limit headers from one response.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    /// Remaining permits in the current window.
    pub remaining: Option<i64>,

    /// Seconds until the window resets, relative to request completion.
    pub reset_after: Option<f64>,

    /// Absolute reset instant as fractional UNIX seconds.
    pub reset_at: Option<f64>,

    /// Whether the limit is the account-wide global one.
    pub global: bool,

    /// Server wall clock from the `Date` header.
    pub server_date: Option<SystemTime>,
}

impl ResponseHeaders {
    /// Parse from a map of lowercase header names to values.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidHeader`] when a present header fails
    /// to parse.
    pub fn parse(headers: &HashMap<String, String>) -> Result<Self, RateLimitError> {
        let mut parsed = Self {
            global: headers.contains_key("x-ratelimit-global"),
            ..Self::default()
        };

        if let Some(raw) = headers.get("x-ratelimit-remaining") {
            parsed.remaining = Some(parse_header(raw, "x-ratelimit-remaining")?);
        }
        if let Some(raw) = headers.get("x-ratelimit-reset-after") {
            parsed.reset_after = Some(parse_header(raw, "x-ratelimit-reset-after")?);
        }
        if let Some(raw) = headers.get("x-ratelimit-reset") {
            parsed.reset_at = Some(parse_header(raw, "x-ratelimit-reset")?);
        }
        if let Some(raw) = headers.get("date") {
            parsed.server_date = Some(parse_http_date(raw)?);
        }

        Ok(parsed)
    }
}

fn parse_header<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T, RateLimitError> {
    raw.parse().map_err(|_| RateLimitError::InvalidHeader {
        header: name.to_owned(),
        value: raw.to_owned(),
    })
}

/// Parse an HTTP `Date` header; the IMF-fixdate the API sends
/// (`Tue, 15 Nov 1994 08:12:31 GMT`) is RFC 2822 shaped.
fn parse_http_date(raw: &str) -> Result<SystemTime, RateLimitError> {
    chrono::DateTime::parse_from_rfc2822(raw)
        .map(SystemTime::from)
        .map_err(|_| RateLimitError::InvalidHeader {
            header: "date".to_owned(),
            value: raw.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn parses_reset_after_and_remaining() {
        let parsed = ResponseHeaders::parse(&headers(&[
            ("x-ratelimit-remaining", "3"),
            ("x-ratelimit-reset-after", "1.250"),
        ]))
        .unwrap();

        assert_eq!(parsed.remaining, Some(3));
        assert_eq!(parsed.reset_after, Some(1.25));
        assert!(!parsed.global);
    }

    #[test]
    fn global_flag_detected() {
        let parsed = ResponseHeaders::parse(&headers(&[
            ("x-ratelimit-global", "true"),
            ("x-ratelimit-reset-after", "2.0"),
        ]))
        .unwrap();
        assert!(parsed.global);
    }

    #[test]
    fn bad_float_is_invalid_header() {
        let err = ResponseHeaders::parse(&headers(&[("x-ratelimit-reset-after", "soon")]))
            .unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidHeader { .. }));
    }

    #[test]
    fn parses_http_date() {
        let parsed = parse_http_date("Tue, 15 Nov 1994 08:12:31 GMT").unwrap();
        let secs = parsed
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(secs, 784_887_151);
    }

    #[test]
    fn rejects_garbage_date() {
        assert!(parse_http_date("yesterday").is_err());
    }
}
