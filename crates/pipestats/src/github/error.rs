//! GitHub API error taxonomy.
//!
//! Every response funnels through [`classify_response`], which sorts failures
//! into the buckets the run orchestration cares about: transient errors are
//! retried by the client, `Throttled` aborts the whole run, `NotReady` and
//! `NotAccessible` are per-resource skips.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::{HttpResponse, header_get};
use crate::ratelimit::throttle_reset_at;

#[derive(Debug, Error)]
pub enum GithubError {
    /// Network-level failure (connect, timeout, TLS). Retried.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status not covered by a more specific variant.
    /// 5xx is considered transient and retried; 4xx is not.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Confirmed rate-limit exhaustion (429, or 403 with a zero-remaining
    /// quota header). Never retried inline; the run aborts and resumes on
    /// the next scheduled invocation.
    #[error("rate limit exhausted, resets at {reset_at}")]
    Throttled { reset_at: DateTime<Utc> },

    /// The server is still preparing the resource (202). Not an error for
    /// the run: the resource is skipped until the next invocation.
    #[error("resource not ready yet (202)")]
    NotReady,

    /// Permission or existence problem for one specific resource (403
    /// without quota exhaustion, or 404). The entity is skipped.
    #[error("resource not accessible ({status}): {url}")]
    NotAccessible { status: u16, url: String },

    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Missing or invalid credentials, detected before any request.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GithubError {
    /// True for failures worth retrying with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            GithubError::Network(_) => true,
            GithubError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True for confirmed rate-limit exhaustion.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, GithubError::Throttled { .. })
    }

    /// True for errors that skip one entity without failing the collector.
    #[must_use]
    pub fn is_entity_skip(&self) -> bool {
        matches!(
            self,
            GithubError::NotAccessible { .. } | GithubError::NotReady
        )
    }
}

/// Sort a response into the error taxonomy. Returns `Ok` for usable 2xx
/// responses.
pub fn classify_response(response: &HttpResponse, url: &str) -> Result<(), GithubError> {
    match response.status {
        202 => Err(GithubError::NotReady),
        s if (200..300).contains(&s) => Ok(()),
        403 => {
            // 403 with X-RateLimit-Remaining: 0 is true exhaustion; any
            // other 403 is a permission problem scoped to this resource.
            let zero_remaining = header_get(&response.headers, "x-ratelimit-remaining")
                .and_then(|v| v.parse::<u32>().ok())
                == Some(0);
            if zero_remaining {
                Err(GithubError::Throttled {
                    reset_at: throttle_reset_at(&response.headers, Utc::now()),
                })
            } else {
                Err(GithubError::NotAccessible {
                    status: 403,
                    url: url.to_string(),
                })
            }
        }
        404 => Err(GithubError::NotAccessible {
            status: 404,
            url: url.to_string(),
        }),
        429 => Err(GithubError::Throttled {
            reset_at: throttle_reset_at(&response.headers, Utc::now()),
        }),
        status => Err(GithubError::Api {
            status,
            message: String::from_utf8_lossy(&response.body)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
        }),
    }
}
