//! Buckets, guards, and the global rate clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::sleep;
use tracing::debug;

use crate::{RateLimitError, RateLimitResult, ResponseHeaders};

/// Pad added to reset deadlines derived from the absolute `X-RateLimit-Reset`
/// header, absorbing clock skew the `Date` correction leaves behind.
const RESET_SKEW_PAD: Duration = Duration::from_millis(250);

/// A fixed client-side window for endpoints whose server buckets lie.
#[derive(Debug, Clone)]
pub struct CustomLimit {
    /// Key suffix the limit applies to.
    pub suffix: &'static str,

    /// Requests allowed per window.
    pub requests: i64,

    /// Window length.
    pub reset: Duration,
}

/// State protected by the bucket's in-flight lock.
#[derive(Debug)]
struct BucketState {
    remaining: i64,
    reset: Option<Instant>,
    last_reset: Option<Instant>,
}

/// One rate limit bucket.
#[derive(Debug)]
pub struct Bucket {
    key: String,
    custom: Option<CustomLimit>,
    global: Arc<AtomicI64>,
    state: Arc<AsyncMutex<BucketState>>,
}

impl Bucket {
    /// The route key this bucket covers.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Exclusive hold on a bucket while one request is in flight.
///
/// One permit has been consumed. Call [`BucketGuard::release`] with the
/// response headers once the request completes; dropping the guard without
/// releasing unlocks the bucket without updating its pacing state.
#[must_use = "dropping the guard without release() discards the response pacing headers"]
pub struct BucketGuard {
    bucket: Arc<Bucket>,
    state: OwnedMutexGuard<BucketState>,
}

impl BucketGuard {
    /// The route key of the held bucket.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.bucket.key
    }

    /// Release the bucket, updating its pacing from response headers.
    ///
    /// Custom-limited buckets advance their own fixed window and ignore the
    /// headers entirely. `None` headers release without any update.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidHeader`] when a header fails to
    /// parse; the bucket is still released, with its reset untouched.
    pub fn release(mut self, headers: Option<&HashMap<String, String>>) -> RateLimitResult<()> {
        if let Some(custom) = &self.bucket.custom {
            let now = Instant::now();
            let window_elapsed = self
                .state
                .last_reset
                .map_or(true, |last| now.duration_since(last) >= custom.reset);

            if window_elapsed {
                self.state.remaining = custom.requests - 1;
                self.state.last_reset = Some(now);
            }
            if self.state.remaining < 1 {
                self.state.reset = Some(now + custom.reset);
            }
            return Ok(());
        }

        let Some(headers) = headers else {
            return Ok(());
        };
        let parsed = ResponseHeaders::parse(headers)?;

        if let Some(reset_after) = parsed.reset_after {
            let delay = Duration::from_secs_f64(reset_after.max(0.0));
            if parsed.global {
                let deadline = unix_nanos(SystemTime::now() + delay);
                self.bucket.global.store(deadline, Ordering::SeqCst);
                debug!(bucket = %self.bucket.key, ?delay, "global rate limit set");
            } else {
                self.state.reset = Some(Instant::now() + delay);
            }
        } else if let Some(reset_at) = parsed.reset_at {
            // Compute the deadline relative to the server's own clock, then
            // pad against residual skew.
            let server_now = parsed.server_date.ok_or_else(|| RateLimitError::InvalidHeader {
                header: "date".to_owned(),
                value: String::new(),
            })?;
            let reset_time = SystemTime::UNIX_EPOCH + Duration::from_secs_f64(reset_at.max(0.0));
            let delta = reset_time
                .duration_since(server_now)
                .unwrap_or(Duration::ZERO)
                + RESET_SKEW_PAD;
            self.state.reset = Some(Instant::now() + delta);
        }

        if let Some(remaining) = parsed.remaining {
            self.state.remaining = remaining;
        }

        Ok(())
    }
}

/// The rate limiter: one bucket per route key plus the global clock.
#[derive(Debug)]
pub struct RateLimiter {
    /// Global lockout deadline as UNIX nanoseconds; 0 when clear.
    global: Arc<AtomicI64>,
    buckets: Mutex<HashMap<String, Arc<Bucket>>>,
    custom_limits: Vec<CustomLimit>,
}

impl RateLimiter {
    /// Create a limiter with the stock custom limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            global: Arc::new(AtomicI64::new(0)),
            buckets: Mutex::new(HashMap::new()),
            // Reaction endpoints report misleading bucket headers; pace them
            // client-side at 1 request per 200 ms.
            custom_limits: vec![CustomLimit {
                suffix: "//reactions//",
                requests: 1,
                reset: Duration::from_millis(200),
            }],
        }
    }

    /// Fetch or create the bucket for a key.
    #[must_use]
    pub fn bucket(&self, key: &str) -> Arc<Bucket> {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(key) {
            return Arc::clone(bucket);
        }

        let custom = self
            .custom_limits
            .iter()
            .find(|limit| key.ends_with(limit.suffix))
            .cloned();

        let bucket = Arc::new(Bucket {
            key: key.to_owned(),
            custom,
            global: Arc::clone(&self.global),
            state: Arc::new(AsyncMutex::new(BucketState {
                remaining: 1,
                reset: None,
                last_reset: None,
            })),
        });
        buckets.insert(key.to_owned(), Arc::clone(&bucket));
        bucket
    }

    /// Acquire the bucket for `key`, waiting out its reset and any global
    /// lockout, and consume one permit.
    ///
    /// The returned guard holds the bucket exclusively until released or
    /// dropped.
    pub async fn acquire(&self, key: &str) -> BucketGuard {
        let bucket = self.bucket(key);
        let mut state = Arc::clone(&bucket.state).lock_owned().await;

        loop {
            let wait = Self::wait_time(&bucket, &state);
            if wait.is_zero() {
                break;
            }
            debug!(bucket = %bucket.key, ?wait, "waiting for rate limit");
            sleep(wait).await;
        }

        state.remaining -= 1;
        BucketGuard { bucket, state }
    }

    /// Remaining wait before a permit may be consumed: the bucket's reset
    /// when it is out of permits, then the global lockout.
    fn wait_time(bucket: &Bucket, state: &BucketState) -> Duration {
        let now = Instant::now();

        if state.remaining < 1 {
            if let Some(reset) = state.reset {
                if reset > now {
                    return reset - now;
                }
            }
        }

        let global = bucket.global.load(Ordering::SeqCst);
        if global > 0 {
            let deadline = SystemTime::UNIX_EPOCH + Duration::from_nanos(global.unsigned_abs());
            if let Ok(wait) = deadline.duration_since(SystemTime::now()) {
                return wait;
            }
        }

        Duration::ZERO
    }

    /// Whether the global lockout is currently active.
    #[must_use]
    pub fn globally_limited(&self) -> bool {
        let global = self.global.load(Ordering::SeqCst);
        global > 0
            && SystemTime::UNIX_EPOCH + Duration::from_nanos(global.unsigned_abs())
                > SystemTime::now()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn unix_nanos(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as i64)
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

    #[tokio::test]
    async fn acquire_consumes_one_permit() {
        let limiter = RateLimiter::new();
        let guard = limiter.acquire("/channels/1/messages").await;
        assert_eq!(guard.state.remaining, 0);
        guard.release(None).unwrap();
    }

    #[tokio::test]
    async fn one_holder_per_bucket() {
        let limiter = Arc::new(RateLimiter::new());
        let guard = limiter.acquire("/channels/1/messages").await;

        let contender = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter.acquire("/channels/1/messages").await.release(None)
            })
        };

        // The second acquire cannot complete while the guard is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        guard.release(None).unwrap();
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reset_after_paces_next_acquire() {
        let limiter = RateLimiter::new();
        let key = "/channels/1/messages";

        let guard = limiter.acquire(key).await;
        let released_at = Instant::now();
        guard
            .release(Some(&headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset-after", "0.200"),
            ])))
            .unwrap();

        let _guard = limiter.acquire(key).await;
        assert!(released_at.elapsed() >= Duration::from_millis(190));
    }

    #[tokio::test]
    async fn remaining_permits_skip_the_wait() {
        let limiter = RateLimiter::new();
        let key = "/channels/1/messages";

        let guard = limiter.acquire(key).await;
        guard
            .release(Some(&headers(&[
                ("x-ratelimit-remaining", "5"),
                ("x-ratelimit-reset-after", "60"),
            ])))
            .unwrap();

        let start = Instant::now();
        let _guard = limiter.acquire(key).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn reset_fallback_matches_reset_after_modulo_skew_pad() {
        let limiter = RateLimiter::new();

        // Bucket A learns its deadline from the relative header.
        let guard = limiter.acquire("/a").await;
        guard
            .release(Some(&headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset-after", "1.000"),
            ])))
            .unwrap();

        // Bucket B learns the same deadline from the absolute header with a
        // Date in 1994; the delta arithmetic cancels the wall clock out.
        let guard = limiter.acquire("/b").await;
        guard
            .release(Some(&headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "784887152.0"),
                ("date", "Tue, 15 Nov 1994 08:12:31 GMT"),
            ])))
            .unwrap();

        let reset_a = limiter.bucket("/a").state.lock().await.reset.unwrap();
        let reset_b = limiter.bucket("/b").state.lock().await.reset.unwrap();

        // B = A + 250 ms skew pad, within scheduling tolerance.
        let diff = reset_b.duration_since(reset_a);
        assert!(diff >= Duration::from_millis(230), "diff was {diff:?}");
        assert!(diff <= Duration::from_millis(290), "diff was {diff:?}");
    }

    #[tokio::test]
    async fn global_lockout_blocks_every_bucket() {
        let limiter = RateLimiter::new();

        let guard = limiter.acquire("/a").await;
        guard
            .release(Some(&headers(&[
                ("x-ratelimit-global", "true"),
                ("x-ratelimit-reset-after", "0.200"),
            ])))
            .unwrap();
        assert!(limiter.globally_limited());

        // A different bucket must also wait out the global clock.
        let start = Instant::now();
        let _guard = limiter.acquire("/b").await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn custom_reaction_bucket_ignores_headers() {
        let limiter = RateLimiter::new();
        let key = "/channels/1/messages//reactions//";

        let guard = limiter.acquire(key).await;
        // Headers promising plenty of permits are ignored for custom keys.
        guard
            .release(Some(&headers(&[
                ("x-ratelimit-remaining", "100"),
                ("x-ratelimit-reset-after", "0.0"),
            ])))
            .unwrap();

        let start = Instant::now();
        let guard = limiter.acquire(key).await;
        guard.release(None).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn invalid_header_reports_but_releases() {
        let limiter = RateLimiter::new();
        let guard = limiter.acquire("/a").await;
        let err = guard
            .release(Some(&headers(&[("x-ratelimit-reset-after", "soon")])))
            .unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidHeader { .. }));

        // The bucket is free again.
        let start = Instant::now();
        let _guard = limiter.acquire("/a").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
