//! Issue/PR collector with incremental comment loading.
//!
//! Listing issues is cheap; fetching each issue's comments to derive the
//! first-response time is not. The comment count reported on the issue
//! itself is used as the freshness signal: comments are only refetched for
//! issues that are new or whose count changed since the checkpoint, and the
//! whole follow-up tier is suppressed when the remaining quota is below the
//! configured floor, reserving budget for the collectors still to run.

use serde::{Deserialize, Serialize};

use crate::checkpoint::{ChangeDetector, CheckpointRecord, FreshnessSignal, StateStore};
use crate::github::types::{Issue, IssueComment, OrgRepo};
use crate::github::{GithubClient, GithubError};

use super::DomainOutcome;
use super::progress::{CollectProgress, ProgressCallback, emit};
use super::records::{IssueRecord, IssueType};

pub const DOMAIN: &str = "issue_stats";

#[derive(Debug, Clone)]
pub struct IssueOptions {
    /// Minimum remaining quota required to fetch comments at all.
    pub comment_quota_floor: u32,
}

impl Default for IssueOptions {
    fn default() -> Self {
        Self {
            comment_quota_floor: crate::ratelimit::quotas::COMMENT_QUOTA_FLOOR,
        }
    }
}

/// Auxiliary fields cached on the checkpoint next to the comment-count
/// signal, reused verbatim when the issue is unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IssueAux {
    first_response_seconds: Option<f64>,
    first_responder: Option<String>,
}

/// First response: the first comment by someone other than the issue
/// author. Review comments are deliberately not considered (one definition
/// per entity type, applied consistently).
fn first_response(issue: &Issue, comments: &[IssueComment]) -> IssueAux {
    for comment in comments {
        let Some(user) = comment.user.as_ref() else {
            continue;
        };
        if user.login != issue.user.login {
            let seconds = (comment.created_at - issue.created_at).num_milliseconds() as f64 / 1000.0;
            return IssueAux {
                first_response_seconds: Some(seconds),
                first_responder: Some(user.login.clone()),
            };
        }
    }
    IssueAux::default()
}

pub async fn collect_issues<S: StateStore>(
    client: &GithubClient,
    org: &str,
    repos: &[OrgRepo],
    store: &mut S,
    options: &IssueOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<(Vec<IssueRecord>, DomainOutcome), GithubError> {
    tracing::info!(repos = repos.len(), "collecting issue and PR stats");
    emit(
        on_progress,
        CollectProgress::DomainStarted {
            domain: DOMAIN,
            entities: repos.len(),
        },
    );

    // Pre-empt the expensive comment tier before touching any issue.
    let mut detector = ChangeDetector::new();
    let status = client.check_quota(options.comment_quota_floor).await?;
    if detector.gate_on_quota(&status, options.comment_quota_floor) {
        emit(
            on_progress,
            CollectProgress::QuotaLow {
                remaining: status.remaining,
                floor: options.comment_quota_floor,
            },
        );
    }

    let mut records = Vec::new();
    let mut outcome = DomainOutcome::new(DOMAIN);
    let checkpoints = store.domain(DOMAIN);

    for repo in repos {
        let issues_path = format!("/repos/{org}/{}/issues?state=all", repo.name);

        let set = match client.fetch_all::<Issue>(&issues_path).await {
            Ok(fetched) => fetched.into_result_set(),
            Err(err) if err.is_throttled() => return Err(err),
            Err(err) => {
                tracing::warn!(repo = %repo.name, error = %err, "skipping issues");
                emit(
                    on_progress,
                    CollectProgress::EntitySkipped {
                        domain: DOMAIN,
                        entity: repo.name.clone(),
                        reason: err.to_string(),
                    },
                );
                outcome.skipped += 1;
                continue;
            }
        };

        if let Some(partial) = &set.partial {
            outcome
                .errors
                .push(format!("{}: partial issue list ({})", repo.name, partial.url));
            emit(
                on_progress,
                CollectProgress::PartialResult {
                    domain: DOMAIN,
                    entity: repo.name.clone(),
                    failed_url: partial.url.clone(),
                },
            );
        }

        for issue in &set.items {
            let entity_key = format!("{}#{}", repo.name, issue.number);
            let signal = FreshnessSignal::Count(issue.comments);

            let mut aux: IssueAux = checkpoints
                .get(&entity_key)
                .and_then(|record| serde_json::from_value(record.cached.clone()).ok())
                .unwrap_or_default();

            let refetch = issue.comments > 0
                && detector.should_refetch(checkpoints, &entity_key, &signal);

            if refetch {
                let comments_path = format!(
                    "/repos/{org}/{}/issues/{}/comments",
                    repo.name, issue.number
                );
                match client.fetch_all::<IssueComment>(&comments_path).await {
                    Ok(fetched) => {
                        aux = first_response(issue, &fetched.into_result_set().items);
                    }
                    Err(err) if err.is_throttled() => return Err(err),
                    Err(err) => {
                        // Keep the previously cached fields; the signal
                        // still moves forward so the next run re-decides.
                        tracing::warn!(
                            issue = %entity_key,
                            error = %err,
                            "comment fetch failed, keeping cached response fields"
                        );
                    }
                }
                checkpoints.insert(
                    entity_key,
                    CheckpointRecord::new(signal, serde_json::to_value(&aux)?),
                );
            }

            records.push(IssueRecord {
                pipeline_name: repo.name.clone(),
                issue_number: issue.number,
                issue_type: if issue.is_pull_request() {
                    IssueType::Pr
                } else {
                    IssueType::Issue
                },
                state: issue.state.clone(),
                created_by: issue.user.login.clone(),
                created_at: issue.created_at,
                updated_at: issue.updated_at,
                closed_at: issue.closed_at,
                closed_wait_seconds: issue.closed_wait_seconds(),
                first_response_seconds: aux.first_response_seconds,
                first_responder: aux.first_responder,
                num_comments: issue.comments,
                html_url: issue.html_url.clone(),
            });
        }

        outcome.succeeded += 1;
    }

    outcome.rows = records.len();
    tracing::info!(
        succeeded = outcome.succeeded,
        skipped = outcome.skipped,
        rows = outcome.rows,
        "issue stats complete"
    );
    emit(
        on_progress,
        CollectProgress::DomainComplete {
            domain: DOMAIN,
            rows: outcome.rows,
            succeeded: outcome.succeeded,
            skipped: outcome.skipped,
        },
    );

    Ok((records, outcome))
}
