//! Rate-limit accounting and the shared retry/backoff policy.
//!
//! Two complementary mechanisms live here:
//!
//! - [`RateLimitStatus`] and the header parsers give collectors a view of the
//!   remaining request quota so expensive work can be pre-empted before the
//!   quota runs dry (see the quota gate in [`crate::checkpoint`]).
//! - [`RetryPolicy`] is the single backoff schedule wrapped around every
//!   outbound request. Transient failures (network, 5xx) are retried here;
//!   confirmed rate-limit exhaustion is never retried inline and instead
//!   surfaces as a fatal error carrying the reset time, so an external
//!   scheduler can resume the run after the window resets.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use backon::ExponentialBuilder;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::http::{HttpHeaders, header_get};

/// Quota floors used by the run orchestration.
pub mod quotas {
    /// Minimum remaining quota required to start another collector.
    pub const RUN_QUOTA_FLOOR: u32 = 100;
    /// Minimum remaining quota required for per-issue comment fetching.
    pub const COMMENT_QUOTA_FLOOR: u32 = 500;
    /// Proactive request pacing (requests per second).
    pub const DEFAULT_RPS: u32 = 10;
}

/// Initial backoff delay.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;
/// Cap on a single backoff delay.
pub const MAX_BACKOFF_MS: u64 = 300_000;
/// Retry attempts after the initial try.
pub const MAX_RETRIES: usize = 5;

/// A point-in-time view of the remote API quota.
///
/// `remaining <= limit`; `reset_at` is the earliest time at which
/// `remaining` returns to `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    /// True when the remaining quota is strictly below `floor`.
    #[must_use]
    pub fn is_below(&self, floor: u32) -> bool {
        self.remaining < floor
    }
}

/// Extract quota state from `X-RateLimit-*` response headers, if present.
#[must_use]
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitStatus> {
    let limit = header_get(headers, "x-ratelimit-limit")?.parse::<u32>().ok()?;
    let remaining = header_get(headers, "x-ratelimit-remaining")?
        .parse::<u32>()
        .ok()?;
    let reset_at = header_get(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .unwrap_or_else(Utc::now);
    Some(RateLimitStatus {
        remaining,
        limit,
        reset_at,
    })
}

/// Resolve the reset time advertised by a throttled response.
///
/// Prefers `X-RateLimit-Reset` (epoch seconds), falls back to `Retry-After`
/// (delay seconds), then to "now" when the server says nothing usable.
#[must_use]
pub fn throttle_reset_at(headers: &HttpHeaders, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(epoch) = header_get(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok())
        && let Some(at) = DateTime::from_timestamp(epoch, 0)
    {
        return at;
    }
    if let Some(secs) = header_get(headers, "retry-after").and_then(|v| v.parse::<i64>().ok()) {
        return now + chrono::Duration::seconds(secs);
    }
    now
}

/// Configuration for the shared retry schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build the exponential backoff strategy from this policy.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Proactive request pacer built on the governor crate.
///
/// This spreads requests out ahead of time so a run rarely slams into the
/// server-side limit at all; the header-driven quota checks above remain the
/// authority on actual exhaustion.
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a pacer allowing `requests_per_second` requests (minimum 1).
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until the pacer allows another request.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(entries: &[(&str, &str)]) -> HttpHeaders {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_rate_limit_headers_reads_all_fields() {
        let h = headers(&[
            ("X-RateLimit-Limit", "5000"),
            ("X-RateLimit-Remaining", "4870"),
            ("X-RateLimit-Reset", "1700000000"),
        ]);
        let status = parse_rate_limit_headers(&h).expect("status");
        assert_eq!(status.limit, 5000);
        assert_eq!(status.remaining, 4870);
        assert_eq!(status.reset_at, DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        assert!(!status.is_below(100));
        assert!(status.is_below(5000));
    }

    #[test]
    fn parse_rate_limit_headers_requires_limit_and_remaining() {
        assert!(parse_rate_limit_headers(&headers(&[("X-RateLimit-Limit", "5000")])).is_none());
        assert!(parse_rate_limit_headers(&Vec::new()).is_none());
    }

    #[test]
    fn throttle_reset_prefers_reset_header_over_retry_after() {
        let now = Utc::now();
        let h = headers(&[
            ("X-RateLimit-Reset", "1700000000"),
            ("Retry-After", "30"),
        ]);
        assert_eq!(
            throttle_reset_at(&h, now),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap()
        );

        let h = headers(&[("Retry-After", "30")]);
        assert_eq!(throttle_reset_at(&h, now), now + chrono::Duration::seconds(30));

        assert_eq!(throttle_reset_at(&Vec::new(), now), now);
    }

    #[test]
    fn retry_policy_defaults_match_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.min_delay, Duration::from_millis(INITIAL_BACKOFF_MS));
        assert_eq!(policy.max_delay, Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(policy.max_retries, MAX_RETRIES);
        assert!(policy.with_jitter);

        let _backoff = policy.with_jitter(false).into_backoff();
    }

    #[test]
    fn pacer_accepts_zero_rps() {
        // Falls back to 1 rps rather than panicking.
        let _ = ApiRateLimiter::new(0);
    }
}
