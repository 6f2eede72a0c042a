//! Contributor collector: weekly commit activity per author per pipeline.
//!
//! `/stats/contributors` is computed server-side; a 202 means the numbers
//! are still being prepared and the repository is skipped for this run.

use chrono::DateTime;

use crate::github::types::{ContributorStats, OrgRepo};
use crate::github::{FetchOutcome, GithubClient, GithubError};

use super::DomainOutcome;
use super::progress::{CollectProgress, ProgressCallback, emit};
use super::records::ContributorRecord;

pub const DOMAIN: &str = "contributor_stats";

/// Flatten one repository's contributor stats into records, dropping weeks
/// with no activity and commits without a linked account.
#[must_use]
pub fn flatten_contributors(pipeline_name: &str, stats: &[ContributorStats]) -> Vec<ContributorRecord> {
    let mut records = Vec::new();

    for contributor in stats {
        let Some(author) = contributor.author.as_ref() else {
            continue;
        };

        for week in &contributor.weeks {
            if week.is_empty() {
                continue;
            }
            let Some(week_start) = DateTime::from_timestamp(week.w, 0) else {
                continue;
            };
            records.push(ContributorRecord {
                pipeline_name: pipeline_name.to_string(),
                author: author.login.clone(),
                avatar_url: author.avatar_url.clone(),
                week_date: week_start.date_naive(),
                week_additions: week.a,
                week_deletions: week.d,
                week_commits: week.c,
            });
        }
    }

    records
}

pub async fn collect_contributors(
    client: &GithubClient,
    org: &str,
    repos: &[OrgRepo],
    on_progress: Option<&ProgressCallback>,
) -> Result<(Vec<ContributorRecord>, DomainOutcome), GithubError> {
    tracing::info!(repos = repos.len(), "collecting contributor stats");
    emit(
        on_progress,
        CollectProgress::DomainStarted {
            domain: DOMAIN,
            entities: repos.len(),
        },
    );

    let mut records = Vec::new();
    let mut outcome = DomainOutcome::new(DOMAIN);

    for repo in repos {
        let path = format!("/repos/{org}/{}/stats/contributors", repo.name);

        let fetched = match client.fetch_all::<ContributorStats>(&path).await {
            Ok(fetched) => fetched,
            Err(err) if err.is_throttled() => return Err(err),
            Err(err) => {
                tracing::warn!(repo = %repo.name, error = %err, "skipping contributor stats");
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

        let stats = match fetched {
            FetchOutcome::Collection(set) => {
                if let Some(partial) = &set.partial {
                    tracing::warn!(
                        repo = %repo.name,
                        failed_url = %partial.url,
                        "contributor stats incomplete, keeping fetched prefix"
                    );
                    emit(
                        on_progress,
                        CollectProgress::PartialResult {
                            domain: DOMAIN,
                            entity: repo.name.clone(),
                            failed_url: partial.url.clone(),
                        },
                    );
                }
                set.items
            }
            // A bare object here means the stats endpoint answered with
            // something other than the contributor list; nothing to emit.
            FetchOutcome::Single(_) => {
                outcome.skipped += 1;
                continue;
            }
        };

        records.extend(flatten_contributors(&repo.name, &stats));
        outcome.succeeded += 1;
    }

    outcome.rows = records.len();
    tracing::info!(
        succeeded = outcome.succeeded,
        skipped = outcome.skipped,
        rows = outcome.rows,
        "contributor stats complete"
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::http::MockTransport;
    use crate::ratelimit::RetryPolicy;

    const ROOT: &str = "https://api.example.com";

    fn test_client(transport: MockTransport) -> GithubClient {
        GithubClient::with_transport(
            "test-token",
            ROOT,
            RetryPolicy::default().with_jitter(false),
            None,
            Arc::new(transport),
        )
        .expect("client")
    }

    fn org_repo(name: &str) -> OrgRepo {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "created_at": "2020-01-01T00:00:00Z",
            "updated_at": "2025-06-01T00:00:00Z",
        }))
        .expect("repo fixture")
    }

    #[test]
    fn flatten_skips_empty_weeks_and_unlinked_authors() {
        let stats: Vec<ContributorStats> = serde_json::from_str(
            r#"[
                {"author":{"login":"ada","avatar_url":"https://a/ada"},
                 "weeks":[{"w":1704067200,"a":10,"d":2,"c":3},{"w":1704672000,"a":0,"d":0,"c":0}]},
                {"author":null,
                 "weeks":[{"w":1704067200,"a":5,"d":5,"c":1}]}
            ]"#,
        )
        .unwrap();

        let records = flatten_contributors("rnaseq", &stats);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].author, "ada");
        assert_eq!(records[0].week_commits, 3);
        // 1704067200 is 2024-01-01.
        assert_eq!(records[0].week_date.to_string(), "2024-01-01");
    }

    #[tokio::test]
    async fn still_computing_stats_skip_the_repo() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{ROOT}/repos/nf-core/fresh/stats/contributors"),
            202,
            "",
        );
        transport.push_json(
            format!("{ROOT}/repos/nf-core/ready/stats/contributors"),
            200,
            r#"[{"author":{"login":"ada","avatar_url":""},"weeks":[{"w":1704067200,"a":1,"d":0,"c":1}]}]"#,
        );

        let client = test_client(transport);
        let repos = vec![org_repo("fresh"), org_repo("ready")];

        let (records, outcome) = collect_contributors(&client, "nf-core", &repos, None)
            .await
            .expect("collect");

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pipeline_name, "ready");
    }
}
