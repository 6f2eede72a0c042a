//! Normalized flat records, one type per domain.
//!
//! These are the outbound contract: each record is a flat mapping with a
//! stable primary key, consumed by an external load step that upserts by
//! key or appends, depending on the domain. Records are produced fresh each
//! run and not retained by the collection logic.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One day of traffic for one pipeline. Primary key:
/// `(pipeline_name, timestamp)`, merged on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficRecord {
    pub pipeline_name: String,
    pub timestamp: DateTime<Utc>,
    pub views: u64,
    pub views_uniques: u64,
    pub clones: u64,
    pub clones_uniques: u64,
}

/// One contributor-week. Primary key: `(pipeline_name, author, week_date)`,
/// merged on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorRecord {
    pub pipeline_name: String,
    pub author: String,
    pub avatar_url: String,
    pub week_date: NaiveDate,
    pub week_additions: i64,
    pub week_deletions: i64,
    pub week_commits: i64,
}

/// One issue or pull request. Primary key:
/// `(pipeline_name, issue_number)`, merged on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub pipeline_name: String,
    pub issue_number: u64,
    pub issue_type: IssueType,
    pub state: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_wait_seconds: Option<f64>,
    pub first_response_seconds: Option<f64>,
    pub first_responder: Option<String>,
    pub num_comments: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Issue,
    Pr,
}

/// Organization head count at a point in time. Primary key: `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberCountRecord {
    pub timestamp: DateTime<Utc>,
    pub num_members: usize,
}

/// One repository in the organization catalog. Primary key: `name`,
/// merged on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub name: String,
    pub description: String,
    pub gh_created_at: DateTime<Utc>,
    pub gh_updated_at: DateTime<Utc>,
    pub gh_pushed_at: Option<DateTime<Utc>>,
    pub stargazers_count: u32,
    pub watchers_count: u32,
    pub forks_count: u32,
    pub open_issues_count: u32,
    pub topics: Vec<String>,
    pub default_branch: Option<String>,
    pub archived: bool,
    pub last_release_date: Option<DateTime<Utc>>,
    pub number_of_releases: Option<u64>,
    pub category: RepoCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoCategory {
    Pipeline,
    Core,
}

/// Workspace membership snapshot. Primary key: `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStatsRecord {
    pub timestamp: DateTime<Utc>,
    pub total_users: usize,
    pub active_users: usize,
    pub inactive_users: usize,
    pub user_details: Vec<WorkspaceUserDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceUserDetail {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub is_bot: bool,
    pub is_active: bool,
}

/// One citation lookup per DOI. Primary key:
/// `(pipeline_name, doi, timestamp)`, merged on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationRecord {
    pub pipeline_name: String,
    pub timestamp: DateTime<Utc>,
    pub doi: String,
    pub paper_title: String,
    pub citation_count: u64,
    pub influential_citation_count: u64,
}
