//! GitHub API client: authentication, request policy, quota checks.
//!
//! All requests go through [`GithubClient::send`], which paces the request
//! and retries transient failures with exponential backoff before
//! classifying the response. There is deliberately no inline sleep
//! on confirmed rate-limit exhaustion: a [`GithubError::Throttled`] is
//! surfaced immediately so the external scheduler can abort the run and
//! resume after the reset, instead of burning wall clock inside the process.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use backon::Retryable;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::http::{HttpRequest, HttpResponse, HttpTransport, reqwest_transport::ReqwestTransport};
use crate::ratelimit::{ApiRateLimiter, RateLimitStatus, RetryPolicy};

use super::error::{GithubError, classify_response};
use super::types::{FileContents, RateLimitResponse};

/// Default API root.
pub const API_ROOT: &str = "https://api.github.com";

/// Accept header pinning the API version.
const ACCEPT: &str = "application/vnd.github.v3+json";

/// Request timeout for the production transport.
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(60);

#[derive(Clone)]
pub struct GithubClient {
    transport: Arc<dyn HttpTransport>,
    api_root: String,
    token: String,
    retry: RetryPolicy,
    pacer: Option<ApiRateLimiter>,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_root", &self.api_root)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    /// Create a client from an API token.
    ///
    /// Fails immediately on a missing token, before any request is made.
    pub fn new(token: &str, pacer: Option<ApiRateLimiter>) -> Result<Self, GithubError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)
            .map_err(|e| GithubError::Config(e.to_string()))?;
        Self::with_transport(
            token,
            API_ROOT,
            RetryPolicy::default(),
            pacer,
            Arc::new(transport),
        )
    }

    /// Create a client over an explicit transport and API root.
    pub fn with_transport(
        token: &str,
        api_root: &str,
        retry: RetryPolicy,
        pacer: Option<ApiRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, GithubError> {
        if token.trim().is_empty() {
            return Err(GithubError::Config(
                "GitHub API token is not configured".to_string(),
            ));
        }
        Ok(Self {
            transport,
            api_root: api_root.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry,
            pacer,
        })
    }

    /// Resolve a path against the API root. Absolute URLs pass through,
    /// which is what the Link-header continuation chain hands us.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.api_root, path)
        }
    }

    /// Standard request headers: bearer token, pinned Accept, user agent.
    #[must_use]
    pub fn request_headers(&self) -> crate::http::HttpHeaders {
        vec![
            ("Authorization".to_string(), format!("token {}", self.token)),
            ("Accept".to_string(), ACCEPT.to_string()),
            ("User-Agent".to_string(), "pipestats".to_string()),
        ]
    }

    /// Send a request through the shared policy and classify the final
    /// response. Transient failures are retried with backoff.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GithubError> {
        if let Some(ref pacer) = self.pacer {
            pacer.wait().await;
        }

        let transport = Arc::clone(&self.transport);
        let op = || {
            let transport = Arc::clone(&transport);
            let request = request.clone();
            async move {
                let url = request.url.clone();
                let response = transport
                    .send(request)
                    .await
                    .map_err(|e| GithubError::Network(e.to_string()))?;
                classify_response(&response, &url)?;
                Ok(response)
            }
        };

        op.retry(self.retry.clone().into_backoff())
            .when(|e: &GithubError| e.is_transient())
            .notify(|err: &GithubError, dur| {
                tracing::debug!(delay = ?dur, error = %err, "retrying transient request failure");
            })
            .await
    }

    /// GET an API path (or absolute URL), returning the raw response.
    pub async fn get(&self, path: &str) -> Result<HttpResponse, GithubError> {
        let url = self.url(path);
        self.send(HttpRequest::get(url, self.request_headers())).await
    }

    /// GET and deserialize a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GithubError> {
        let response = self.get(path).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Read the current core quota from the dedicated endpoint.
    pub async fn rate_limit(&self) -> Result<RateLimitStatus, GithubError> {
        let response: RateLimitResponse = self.get_json("/rate_limit").await?;
        let core = response.resources.core;
        Ok(RateLimitStatus {
            remaining: core.remaining,
            limit: core.limit,
            reset_at: DateTime::from_timestamp(core.reset, 0).unwrap_or_else(Utc::now),
        })
    }

    /// Check the quota and warn when it is below `min_remaining`.
    ///
    /// Collectors call this before expensive follow-up batches so exhaustion
    /// is discovered up front rather than mid-batch.
    pub async fn check_quota(&self, min_remaining: u32) -> Result<RateLimitStatus, GithubError> {
        let status = self.rate_limit().await?;
        tracing::info!(
            remaining = status.remaining,
            limit = status.limit,
            reset_at = %status.reset_at,
            "rate limit status"
        );
        if status.is_below(min_remaining) {
            tracing::warn!(
                remaining = status.remaining,
                min_remaining,
                "rate limit quota below configured floor"
            );
        }
        Ok(status)
    }

    /// Fetch a file from a repository's default branch, decoded to text.
    pub async fn file_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<String, GithubError> {
        let path = path.trim_start_matches('/');
        let contents: FileContents = self
            .get_json(&format!("/repos/{owner}/{repo}/contents/{path}"))
            .await?;

        let Some(encoded) = contents.content else {
            return Err(GithubError::Api {
                status: 200,
                message: format!("no content field for {owner}/{repo}/{path}"),
            });
        };
        if let Some(encoding) = contents.encoding.as_deref()
            && encoding != "base64"
        {
            return Err(GithubError::Api {
                status: 200,
                message: format!("unexpected contents encoding: {encoding}"),
            });
        }

        let raw: String = encoded.split_whitespace().collect();
        let bytes = BASE64
            .decode(raw.as_bytes())
            .map_err(|e| GithubError::Api {
                status: 200,
                message: format!("invalid base64 contents: {e}"),
            })?;
        String::from_utf8(bytes).map_err(|e| GithubError::Api {
            status: 200,
            message: format!("contents are not valid UTF-8: {e}"),
        })
    }
}
