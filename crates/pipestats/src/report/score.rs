//! Pipeline status classification and the trust score.
//!
//! The trust score is a 0-100 weighted blend of four sub-scores:
//! maintenance activity 30%, issue resolution 25%, PR management 20%,
//! community engagement 25%. Decay constants and thresholds follow the
//! regulatory report definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReportRow;

const WEIGHT_MAINTENANCE: f64 = 0.30;
const WEIGHT_ISSUE_RESOLUTION: f64 = 0.25;
const WEIGHT_PR_MANAGEMENT: f64 = 0.20;
const WEIGHT_COMMUNITY: f64 = 0.25;

/// Release-recency decay constant, in days.
const MAINTENANCE_DECAY_DAYS: f64 = 240.0;
/// Issue close-time decay constant, in days.
const ISSUE_SPEED_DECAY_DAYS: f64 = 45.0;
/// PR close-time decay constant, in days.
const PR_SPEED_DECAY_DAYS: f64 = 14.0;

/// Stars at which the community star sub-score saturates.
const STAR_SATURATION: f64 = 500.0;
/// Forks at which the community fork sub-score saturates.
const FORK_SATURATION: f64 = 200.0;

/// Neutral sub-score when closure speed data is missing.
const NEUTRAL_SPEED: f64 = 50.0;
/// Default resolution/management score when there is nothing to resolve.
const NO_ACTIVITY_DEFAULT: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Archived,
    #[serde(rename = "In Development")]
    InDevelopment,
    Active,
    Maintenance,
    Legacy,
}

/// Classify a pipeline by its release recency.
#[must_use]
pub fn classify_status(row: &ReportRow, now: DateTime<Utc>) -> PipelineStatus {
    if row.archived {
        return PipelineStatus::Archived;
    }
    if !row.has_release {
        return PipelineStatus::InDevelopment;
    }
    match row.last_release_date {
        Some(release) => {
            let days = (now - release).num_days();
            if days < 180 {
                PipelineStatus::Active
            } else if days < 365 {
                PipelineStatus::Maintenance
            } else {
                PipelineStatus::Legacy
            }
        }
        None => PipelineStatus::InDevelopment,
    }
}

/// The four sub-scores, each 0-100, kept on the output for inspection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustComponents {
    pub maintenance: f64,
    pub issue_resolution: f64,
    pub pr_management: f64,
    pub community: f64,
}

impl TrustComponents {
    /// Weighted blend, rounded to one decimal.
    #[must_use]
    pub fn weighted_score(&self) -> f64 {
        let score = self.maintenance * WEIGHT_MAINTENANCE
            + self.issue_resolution * WEIGHT_ISSUE_RESOLUTION
            + self.pr_management * WEIGHT_PR_MANAGEMENT
            + self.community * WEIGHT_COMMUNITY;
        (score * 10.0).round() / 10.0
    }
}

/// Closure-rate plus closure-speed blend shared by the issue and PR
/// sub-scores: 70% closure ratio, 30% speed.
fn resolution_score(
    total: u64,
    closed: u64,
    median_close_seconds: Option<f64>,
    decay_days: f64,
) -> f64 {
    if total == 0 {
        return NO_ACTIVITY_DEFAULT;
    }
    let closure_score = (closed as f64 / total as f64) * 100.0;
    let speed_score = match median_close_seconds {
        Some(seconds) => {
            let days_to_close = seconds / 86_400.0;
            100.0 * (-days_to_close / decay_days).exp()
        }
        None => NEUTRAL_SPEED,
    };
    0.7 * closure_score + 0.3 * speed_score
}

#[must_use]
pub fn trust_components(row: &ReportRow, now: DateTime<Utc>) -> TrustComponents {
    let maintenance = match row.last_release_date {
        Some(release) => {
            let days = (now - release).num_days() as f64;
            100.0 * (-days / MAINTENANCE_DECAY_DAYS).exp()
        }
        None => 0.0,
    };

    let issue_resolution = resolution_score(
        row.issue_count,
        row.closed_issue_count,
        row.median_seconds_to_issue_closed,
        ISSUE_SPEED_DECAY_DAYS,
    );

    let pr_management = resolution_score(
        row.pr_count,
        row.closed_pr_count,
        row.median_seconds_to_pr_closed,
        PR_SPEED_DECAY_DAYS,
    );

    let star_score =
        ((1.0 + f64::from(row.stargazers_count)).ln() / (1.0 + STAR_SATURATION).ln() * 100.0)
            .min(100.0);
    let fork_score = ((1.0 + f64::from(row.forks_count)).ln() / (1.0 + FORK_SATURATION).ln()
        * 100.0)
        .min(100.0);
    let community = 0.6 * star_score + 0.4 * fork_score;

    TrustComponents {
        maintenance,
        issue_resolution,
        pr_management,
        community,
    }
}

/// One scored pipeline, ready for the report output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPipeline {
    pub pipeline_name: String,
    pub status: PipelineStatus,
    pub trust_score: f64,
    pub components: TrustComponents,
}

#[must_use]
pub fn score_pipeline(row: &ReportRow, now: DateTime<Utc>) -> ScoredPipeline {
    let components = trust_components(row, now);
    ScoredPipeline {
        pipeline_name: row.pipeline_name.clone(),
        status: classify_status(row, now),
        trust_score: components.weighted_score(),
        components,
    }
}
