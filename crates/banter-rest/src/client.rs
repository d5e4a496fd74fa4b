//! The rate-limit-coordinated HTTP client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use banter_model::{File, RateLimited, TooManyRequests};
use banter_ratelimit::RateLimiter;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{RestError, RestResult};

/// Library version baked into the user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default REST API base.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const CLIENT_TIMEOUT: Duration = Duration::from_secs(20);
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Callback invoked whenever a request receives a 429.
pub type RateLimitHook = Arc<dyn Fn(RateLimited) + Send + Sync>;

/// Request body shapes the client can send.
pub enum RequestBody {
    /// No body.
    Empty,
    /// JSON body.
    Json(Value),
    /// `multipart/form-data` with a `payload_json` part followed by one
    /// `files[i]` part per file.
    Multipart {
        payload_json: Value,
        files: Vec<File>,
    },
}

/// Discord REST client coordinated through the rate limiter.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    max_retries: u32,
    retry_on_rate_limit: bool,
    limiter: Arc<RateLimiter>,
    rate_limit_hook: RwLock<Option<RateLimitHook>>,
}

impl RestClient {
    /// Create a client for a bot token.
    ///
    /// # Errors
    ///
    /// Returns an HTTP error when the underlying client fails to build.
    pub fn new(token: &str, limiter: Arc<RateLimiter>) -> RestResult<Self> {
        Self::with_base_url(token, limiter, DEFAULT_API_BASE)
    }

    /// Create a client against a different API base (mock servers, proxies).
    ///
    /// # Errors
    ///
    /// Returns an HTTP error when the underlying client fails to build.
    pub fn with_base_url(
        token: &str,
        limiter: Arc<RateLimiter>,
        base_url: &str,
    ) -> RestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .user_agent(format!(
                "banter (https://github.com/banter-rs/banter, v{VERSION})"
            ))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.strip_prefix("Bot ").unwrap_or(token).to_owned(),
            max_retries: 3,
            retry_on_rate_limit: true,
            limiter,
            rate_limit_hook: RwLock::new(None),
        })
    }

    /// Set the maximum retry count for 429 and 5xx responses.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Enable or disable sleeping out 429 responses.
    #[must_use]
    pub fn with_retry_on_rate_limit(mut self, retry: bool) -> Self {
        self.retry_on_rate_limit = retry;
        self
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Install a callback fired on every 429 response.
    pub fn set_rate_limit_hook(&self, hook: RateLimitHook) {
        *self.rate_limit_hook.write() = Some(hook);
    }

    /// Perform a request under `bucket`, returning the raw response body.
    ///
    /// Retries 429s (sleeping the server-supplied delay) and 5xx/transport
    /// failures up to the configured retry count.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Api`] for non-success statuses,
    /// [`RestError::RateLimited`] when retries run out on 429s, and
    /// [`RestError::Http`] for transport failures.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        bucket: &str,
        body: &RequestBody,
    ) -> RestResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempts = 0u32;
        let mut delay = RETRY_BASE_DELAY;

        loop {
            attempts += 1;
            debug!(attempt = attempts, %method, path, bucket, "REST request");

            let guard = self.limiter.acquire(bucket).await;
            let request = self.build_request(method.clone(), &url, body)?;

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    // Transport failure: nothing to learn from headers.
                    let _ = guard.release(None);
                    if (e.is_timeout() || e.is_connect()) && attempts <= self.max_retries {
                        warn!(attempt = attempts, error = %e, "retrying after connection error");
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(RETRY_MAX_DELAY);
                        continue;
                    }
                    return Err(RestError::Http(e));
                }
            };

            let status = response.status();
            let headers = header_map_to_lowercase(response.headers());
            let bytes = response.bytes().await.map_err(RestError::Http)?;
            guard.release(Some(&headers))?;

            if status.is_success() {
                return Ok(bytes.to_vec());
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let body: TooManyRequests = serde_json::from_slice(&bytes).unwrap_or_default();
                let event = RateLimited {
                    response: body,
                    url: url.clone(),
                };
                self.emit_rate_limit(&event);

                if self.retry_on_rate_limit && attempts <= self.max_retries {
                    let wait = Duration::from_secs_f64(
                        event.response.retry_after.clamp(0.0, 3600.0),
                    );
                    warn!(bucket, wait_ms = wait.as_millis(), "rate limited, retrying");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                return Err(RestError::RateLimited {
                    retry_after: event.response.retry_after,
                    bucket: bucket.to_owned(),
                });
            }

            let err = api_error(status, &bytes);
            if err.is_retryable() && attempts <= self.max_retries {
                warn!(attempt = attempts, error = %err, "retrying after server error");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(RETRY_MAX_DELAY);
                continue;
            }
            return Err(err);
        }
    }

    /// Perform a request and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// As [`RestClient::request`], plus [`RestError::Json`] when the body
    /// does not match `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bucket: &str,
        body: &RequestBody,
    ) -> RestResult<T> {
        let bytes = self.request(method, path, bucket, body).await?;
        serde_json::from_slice(&bytes).map_err(RestError::Json)
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        body: &RequestBody,
    ) -> RestResult<reqwest::RequestBuilder> {
        let mut request = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bot {}", self.token));

        match body {
            RequestBody::Empty => {}
            RequestBody::Json(value) => {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(serde_json::to_vec(value)?);
            }
            RequestBody::Multipart {
                payload_json,
                files,
            } => {
                let mut form = reqwest::multipart::Form::new()
                    .text("payload_json", serde_json::to_string(payload_json)?);

                for (i, file) in files.iter().enumerate() {
                    let mut part = reqwest::multipart::Part::bytes(file.data.clone())
                        .file_name(file.name.clone());
                    if !file.content_type.is_empty() {
                        part = part.mime_str(&file.content_type).map_err(RestError::Http)?;
                    }
                    form = form.part(format!("files[{i}]"), part);
                }

                request = request.multipart(form);
            }
        }

        Ok(request)
    }

    fn emit_rate_limit(&self, event: &RateLimited) {
        let hook = self.rate_limit_hook.read().clone();
        if let Some(hook) = hook {
            hook(event.clone());
        }
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Decode a Discord error envelope into an [`RestError::Api`].
fn api_error(status: StatusCode, bytes: &[u8]) -> RestError {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        code: Option<i64>,
        message: Option<String>,
    }

    let envelope: ErrorEnvelope = serde_json::from_slice(bytes).unwrap_or(ErrorEnvelope {
        code: None,
        message: None,
    });

    RestError::Api {
        status: status.as_u16(),
        api_code: envelope.code.unwrap_or(0),
        message: envelope
            .message
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn header_map_to_lowercase(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
        })
        .collect()
}
