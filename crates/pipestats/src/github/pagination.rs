//! Link-header pagination over the REST API.
//!
//! The three response shapes the API serves (bare list, object wrapping an
//! `items` array, single non-paginated object) are resolved once here into a
//! tagged union instead of being re-checked at every call site. The Link
//! header's `rel="next"` URL is the sole continuation signal: concatenating
//! pages in fetch order yields the complete result set.

use serde::de::DeserializeOwned;

use super::client::GithubClient;
use super::error::GithubError;

/// The first page fetch that failed after retries, ending pagination early.
#[derive(Debug)]
pub struct PartialFailure {
    pub url: String,
    pub error: GithubError,
}

/// Accumulated items across all fetched pages.
///
/// When `partial` is set, the chain was cut short by a failing page and the
/// caller decides whether the prefix is acceptable or the whole fetch must
/// be re-run.
#[derive(Debug)]
pub struct ResultSet<T> {
    pub items: Vec<T>,
    pub partial: Option<PartialFailure>,
}

impl<T> ResultSet<T> {
    #[must_use]
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            partial: None,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.partial.is_none()
    }
}

/// What a paginated fetch resolved to.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// One or more pages of items.
    Collection(ResultSet<T>),
    /// A single non-paginated object, returned as-is without iteration.
    Single(T),
}

impl<T> FetchOutcome<T> {
    /// Flatten to a result set; a single object becomes a one-item set.
    #[must_use]
    pub fn into_result_set(self) -> ResultSet<T> {
        match self {
            FetchOutcome::Collection(set) => set,
            FetchOutcome::Single(item) => ResultSet::complete(vec![item]),
        }
    }
}

/// One decoded page body.
enum PageItems<T> {
    Items(Vec<T>),
    Bare(T),
}

fn decode_page<T: DeserializeOwned>(body: &[u8]) -> Result<PageItems<T>, GithubError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    match value {
        serde_json::Value::Array(_) => Ok(PageItems::Items(serde_json::from_value(value)?)),
        serde_json::Value::Object(ref map) if map.get("items").is_some_and(|v| v.is_array()) => {
            let items = map.get("items").cloned().unwrap_or_default();
            Ok(PageItems::Items(serde_json::from_value(items)?))
        }
        other => Ok(PageItems::Bare(serde_json::from_value(other)?)),
    }
}

/// Extract the `rel="next"` URL from a Link header.
///
/// Link headers look like:
/// `<https://api.github.com/organizations/123/repos?page=2>; rel="next", <...&page=9>; rel="last"`
#[must_use]
pub fn parse_next_link(link_header: &str) -> Option<String> {
    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;
        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(value) = segment.strip_prefix("rel=") {
                rel = Some(value.trim_matches('"'));
            }
        }

        if rel == Some("next")
            && let Some(url) = url
        {
            return Some(url.to_string());
        }
    }
    None
}

impl GithubClient {
    /// Fetch every item across all pages starting from `path`.
    ///
    /// Error handling follows the run policy: `Throttled` propagates so the
    /// run can abort; `NotReady` and `NotAccessible` propagate so the caller
    /// can skip the resource; a page failing after transient retries ends
    /// the chain early with a partial result carrying the failing URL.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<FetchOutcome<T>, GithubError> {
        let mut url = self.url(path);
        let mut items: Vec<T> = Vec::new();
        let mut first_page = true;

        loop {
            let response = match self.get(&url).await {
                Ok(response) => response,
                Err(err) if err.is_throttled() || err.is_entity_skip() => return Err(err),
                Err(GithubError::Config(msg)) => return Err(GithubError::Config(msg)),
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "page fetch failed, returning partial result");
                    return Ok(FetchOutcome::Collection(ResultSet {
                        items,
                        partial: Some(PartialFailure { url, error: err }),
                    }));
                }
            };

            match decode_page::<T>(&response.body)? {
                PageItems::Bare(value) if first_page => return Ok(FetchOutcome::Single(value)),
                PageItems::Bare(_) => {
                    return Err(GithubError::Api {
                        status: response.status,
                        message: format!("non-paginated object in page chain at {url}"),
                    });
                }
                PageItems::Items(batch) => items.extend(batch),
            }

            match response.header("link").and_then(parse_next_link) {
                Some(next) => url = next,
                None => break,
            }
            first_page = false;
        }

        Ok(FetchOutcome::Collection(ResultSet::complete(items)))
    }

    /// Fetch a single non-paginated object (e.g. a traffic aggregate).
    pub async fn fetch_one<T: DeserializeOwned>(&self, path: &str) -> Result<T, GithubError> {
        self.get_json(path).await
    }
}
