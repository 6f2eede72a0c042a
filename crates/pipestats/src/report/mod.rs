//! Trust-score reporting over collected records.
//!
//! The warehouse owns the loaded records; this module aggregates the
//! per-pipeline inputs (issue/PR counts, close-time medians, release and
//! community numbers) directly from collected catalog and issue records and
//! feeds them to the scoring arithmetic in [`score`].

pub mod score;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::collect::records::{CatalogRecord, IssueRecord, IssueType, RepoCategory};

pub use score::{PipelineStatus, ScoredPipeline, TrustComponents};

/// Aggregated scoring inputs for one pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRow {
    pub pipeline_name: String,
    pub archived: bool,
    pub stargazers_count: u32,
    pub forks_count: u32,
    pub last_release_date: Option<DateTime<Utc>>,
    pub has_release: bool,
    pub issue_count: u64,
    pub closed_issue_count: u64,
    pub median_seconds_to_issue_closed: Option<f64>,
    pub pr_count: u64,
    pub closed_pr_count: u64,
    pub median_seconds_to_pr_closed: Option<f64>,
}

/// Median of the values; the mean of the middle pair for even counts.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Build one report row per catalog pipeline from collected records.
#[must_use]
pub fn aggregate(catalog: &[CatalogRecord], issues: &[IssueRecord]) -> Vec<ReportRow> {
    let mut rows: BTreeMap<String, ReportRow> = BTreeMap::new();

    for record in catalog {
        if record.category != RepoCategory::Pipeline {
            continue;
        }
        rows.insert(
            record.name.clone(),
            ReportRow {
                pipeline_name: record.name.clone(),
                archived: record.archived,
                stargazers_count: record.stargazers_count,
                forks_count: record.forks_count,
                last_release_date: record.last_release_date,
                has_release: record.number_of_releases.unwrap_or(0) > 0,
                ..ReportRow::default()
            },
        );
    }

    let mut issue_close_times: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut pr_close_times: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for issue in issues {
        let Some(row) = rows.get_mut(&issue.pipeline_name) else {
            continue;
        };
        let closed = issue.state == "closed";
        match issue.issue_type {
            IssueType::Issue => {
                row.issue_count += 1;
                if closed {
                    row.closed_issue_count += 1;
                    if let Some(wait) = issue.closed_wait_seconds {
                        issue_close_times
                            .entry(issue.pipeline_name.clone())
                            .or_default()
                            .push(wait);
                    }
                }
            }
            IssueType::Pr => {
                row.pr_count += 1;
                if closed {
                    row.closed_pr_count += 1;
                    if let Some(wait) = issue.closed_wait_seconds {
                        pr_close_times
                            .entry(issue.pipeline_name.clone())
                            .or_default()
                            .push(wait);
                    }
                }
            }
        }
    }

    for (name, row) in rows.iter_mut() {
        row.median_seconds_to_issue_closed =
            issue_close_times.get(name).and_then(|v| median(v));
        row.median_seconds_to_pr_closed = pr_close_times.get(name).and_then(|v| median(v));
    }

    rows.into_values().collect()
}

/// Score every pipeline row.
#[must_use]
pub fn score_pipelines(rows: &[ReportRow], now: DateTime<Utc>) -> Vec<ScoredPipeline> {
    rows.iter().map(|row| score::score_pipeline(row, now)).collect()
}
