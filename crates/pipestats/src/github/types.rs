//! Wire types for the GitHub REST responses the collectors consume.
//!
//! Only the fields the collectors read are modeled; everything else in the
//! responses is ignored by serde.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One repository from the org listing.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgRepo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub watchers_count: u32,
    #[serde(default)]
    pub forks_count: u32,
    #[serde(default)]
    pub open_issues_count: u32,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// One day of a traffic time series (views or clones).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TrafficPoint {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
    pub uniques: u64,
}

/// `/traffic/views` aggregate: a bare object wrapping the daily series.
#[derive(Debug, Clone, Deserialize)]
pub struct TrafficViews {
    #[serde(default)]
    pub views: Vec<TrafficPoint>,
}

/// `/traffic/clones` aggregate: a bare object wrapping the daily series.
#[derive(Debug, Clone, Deserialize)]
pub struct TrafficClones {
    #[serde(default)]
    pub clones: Vec<TrafficPoint>,
}

/// Per-contributor weekly commit statistics from `/stats/contributors`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributorStats {
    /// Null for commits whose author has no GitHub account.
    pub author: Option<ContributorAuthor>,
    #[serde(default)]
    pub weeks: Vec<ContributorWeek>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContributorAuthor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// One week of contributor activity: week start epoch, additions,
/// deletions, commits.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ContributorWeek {
    pub w: i64,
    #[serde(default)]
    pub a: i64,
    #[serde(default)]
    pub d: i64,
    #[serde(default)]
    pub c: i64,
}

impl ContributorWeek {
    /// True when the week carries no activity at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.a == 0 && self.d == 0 && self.c == 0
    }
}

/// An issue or pull request from `/issues?state=all`.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub state: String,
    pub user: IssueUser,
    /// Comment count as reported on the issue itself; this is the cheap
    /// freshness signal that gates comment fetching.
    #[serde(default)]
    pub comments: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: String,
    /// Present iff the issue is a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    #[must_use]
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    /// Seconds from creation to close, when closed.
    #[must_use]
    pub fn closed_wait_seconds(&self) -> Option<f64> {
        self.closed_at
            .map(|closed| (closed - self.created_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueUser {
    pub login: String,
}

/// One comment on an issue, in creation order.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    /// Null for comments from deleted accounts.
    #[serde(default)]
    pub user: Option<IssueUser>,
    pub created_at: DateTime<Utc>,
}

/// One organization member from `/orgs/{org}/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgMember {
    pub login: String,
}

/// Response envelope of the dedicated `/rate_limit` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResponse {
    pub resources: RateLimitResources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResources {
    pub core: RateLimitResource,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitResource {
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
}

/// `/repos/{owner}/{repo}/contents/{path}` response: base64-encoded body.
#[derive(Debug, Clone, Deserialize)]
pub struct FileContents {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_distinguishes_pull_requests() {
        let issue: Issue = serde_json::from_str(
            r#"{
                "number": 12,
                "state": "open",
                "user": {"login": "ada"},
                "comments": 3,
                "created_at": "2025-01-02T03:04:05Z",
                "updated_at": "2025-01-03T03:04:05Z",
                "html_url": "https://github.com/org/repo/pull/12",
                "pull_request": {"url": "https://api.github.com/repos/org/repo/pulls/12"}
            }"#,
        )
        .unwrap();
        assert!(issue.is_pull_request());
        assert_eq!(issue.closed_wait_seconds(), None);

        let issue: Issue = serde_json::from_str(
            r#"{
                "number": 13,
                "state": "closed",
                "user": {"login": "ada"},
                "created_at": "2025-01-02T00:00:00Z",
                "updated_at": "2025-01-02T00:00:00Z",
                "closed_at": "2025-01-02T01:00:00Z"
            }"#,
        )
        .unwrap();
        assert!(!issue.is_pull_request());
        assert_eq!(issue.closed_wait_seconds(), Some(3600.0));
    }

    #[test]
    fn contributor_week_emptiness() {
        let week = ContributorWeek { w: 0, a: 0, d: 0, c: 0 };
        assert!(week.is_empty());
        let week = ContributorWeek { w: 0, a: 0, d: 0, c: 2 };
        assert!(!week.is_empty());
    }

    #[test]
    fn org_repo_tolerates_missing_optionals() {
        let repo: OrgRepo = serde_json::from_str(
            r#"{
                "name": "rnaseq",
                "created_at": "2020-01-01T00:00:00Z",
                "updated_at": "2025-06-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(repo.name, "rnaseq");
        assert!(!repo.archived);
        assert_eq!(repo.stargazers_count, 0);
        assert!(repo.pushed_at.is_none());
    }
}
