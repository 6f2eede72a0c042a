//! Transport boundary for all outbound HTTP I/O.
//!
//! Collectors never touch a socket directly: every request goes through the
//! [`HttpTransport`] trait, backed by reqwest in production and by an
//! in-memory mock in unit tests.

use async_trait::async_trait;
use thiserror::Error;

/// HTTP methods used by the collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// HTTP headers as key/value pairs.
///
/// Header names are matched case-insensitively by [`header_get`].
pub type HttpHeaders = Vec<(String, String)>;

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Build a GET request with the given headers and no body.
    #[must_use]
    pub fn get(url: impl Into<String>, headers: HttpHeaders) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers,
            body: Vec::new(),
        }
    }

    /// Build a POST request carrying a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, mut headers: HttpHeaders, body: Vec<u8>) -> Self {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers,
            body,
        }
    }
}

/// A response as seen by the policy layer: status, headers, raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no mock response registered for {method} {url}")]
    NoMockResponse { method: String, url: String },
}

/// Transport boundary for all HTTP I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub mod reqwest_transport {
    use super::*;

    use std::time::Duration as StdDuration;

    /// Production transport backed by a shared reqwest client.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        pub fn with_timeout(timeout: StdDuration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let method = match request.method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
            };

            let mut builder = self.client.request(method, &request.url);
            for (k, v) in request.headers {
                builder = builder.header(&k, &v);
            }
            if !request.body.is_empty() {
                builder = builder.body(request.body);
            }

            let resp = builder
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            let status = resp.status().as_u16();
            let headers: HttpHeaders = resp
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();

            let body = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::{HashMap, VecDeque};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// In-memory mock transport for unit tests: no sockets, no loopback servers.
///
/// Responses registered for the same method + URL are returned in FIFO
/// order; the last registered response is replayed once the queue drains,
/// so retry loops see a stable terminal answer.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockTransportInner {
    routes: HashMap<(HttpMethod, String), VecDeque<HttpResponse>>,
    requests: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for a method + URL.
    pub fn push_response(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        response: HttpResponse,
    ) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner
            .routes
            .entry((method, url.into()))
            .or_default()
            .push_back(response);
    }

    /// Shorthand for registering a JSON body under a GET URL.
    pub fn push_json(&self, url: impl Into<String>, status: u16, body: &str) {
        self.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            },
        );
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        let inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.requests.clone()
    }

    /// Number of requests sent to a given URL, any method.
    #[must_use]
    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.url == url).count()
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");

        let key = (request.method, request.url.clone());
        inner.requests.push(request);

        match inner.routes.get_mut(&key) {
            Some(queue) => {
                if queue.len() > 1 {
                    Ok(queue.pop_front().expect("non-empty queue"))
                } else {
                    // Replay the terminal response for repeated calls.
                    queue.front().cloned().ok_or(HttpError::NoMockResponse {
                        method: key.0.as_str().to_string(),
                        url: key.1,
                    })
                }
            }
            None => Err(HttpError::NoMockResponse {
                method: key.0.as_str().to_string(),
                url: key.1,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_get_is_case_insensitive_and_returns_first_match() {
        let headers: HttpHeaders = vec![
            ("X-RateLimit-Remaining".to_string(), "41".to_string()),
            ("x-ratelimit-remaining".to_string(), "0".to_string()),
        ];
        assert_eq!(header_get(&headers, "x-ratelimit-remaining"), Some("41"));
        assert_eq!(header_get(&headers, "X-RATELIMIT-REMAINING"), Some("41"));
        assert_eq!(header_get(&headers, "missing"), None);
    }

    #[test]
    fn post_json_sets_content_type() {
        let req = HttpRequest::post_json("https://example.com/graphql", Vec::new(), b"{}".to_vec());
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(header_get(&req.headers, "content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn mock_transport_returns_responses_in_fifo_order() {
        let transport = MockTransport::new();
        let url = "https://example.com/api";

        transport.push_json(url, 500, "{}");
        transport.push_json(url, 200, r#"{"ok":true}"#);

        let first = transport
            .send(HttpRequest::get(url, Vec::new()))
            .await
            .expect("mock response");
        assert_eq!(first.status, 500);

        let second = transport
            .send(HttpRequest::get(url, Vec::new()))
            .await
            .expect("mock response");
        assert_eq!(second.status, 200);
        assert!(second.is_success());

        // Queue drained to its last entry: replay it.
        let third = transport
            .send(HttpRequest::get(url, Vec::new()))
            .await
            .expect("mock response");
        assert_eq!(third.status, 200);

        assert_eq!(transport.request_count(url), 3);
    }

    #[tokio::test]
    async fn mock_transport_errors_when_no_response_is_registered() {
        let transport = MockTransport::new();
        let err = transport
            .send(HttpRequest::get("https://example.com/missing", Vec::new()))
            .await
            .expect_err("missing mock should error");
        match err {
            HttpError::NoMockResponse { method, url } => {
                assert_eq!(method, "GET");
                assert_eq!(url, "https://example.com/missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
