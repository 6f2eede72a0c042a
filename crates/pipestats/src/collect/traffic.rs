//! Traffic collector: daily views and clones per pipeline.
//!
//! Traffic endpoints are expensive (two requests per repository) and only
//! return a 14-day window, so the collector bounds its request volume: only
//! repositories that are not archived and were updated inside a trailing
//! activity window are considered, capped to the top N by star count.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::github::types::{OrgRepo, TrafficClones, TrafficPoint, TrafficViews};
use crate::github::{GithubClient, GithubError};

use super::DomainOutcome;
use super::progress::{CollectProgress, ProgressCallback, emit};
use super::records::TrafficRecord;

pub const DOMAIN: &str = "traffic_stats";

#[derive(Debug, Clone)]
pub struct TrafficOptions {
    /// Restrict to repositories updated inside `active_within`.
    pub only_active: bool,
    /// Trailing activity window.
    pub active_within: Duration,
    /// Cap to the top N repositories by stars; `None` for all.
    pub max_repos: Option<usize>,
}

impl Default for TrafficOptions {
    fn default() -> Self {
        Self {
            only_active: true,
            active_within: Duration::days(180),
            max_repos: Some(30),
        }
    }
}

/// Pick the repositories worth spending traffic quota on.
#[must_use]
pub fn select_repos<'a>(
    repos: &'a [OrgRepo],
    options: &TrafficOptions,
    now: DateTime<Utc>,
) -> Vec<&'a OrgRepo> {
    let mut selected: Vec<&OrgRepo> = if options.only_active {
        let cutoff = now - options.active_within;
        repos
            .iter()
            .filter(|repo| !repo.archived && repo.updated_at > cutoff)
            .collect()
    } else {
        repos.iter().collect()
    };

    selected.sort_by(|a, b| b.stargazers_count.cmp(&a.stargazers_count));
    if let Some(max) = options.max_repos {
        selected.truncate(max);
    }
    selected
}

/// Join the views and clones series by timestamp, zero-filling either side
/// so no exclusive timestamp is dropped.
#[must_use]
pub fn merge_traffic(
    pipeline_name: &str,
    views: &[TrafficPoint],
    clones: &[TrafficPoint],
) -> Vec<TrafficRecord> {
    let blank = |timestamp: DateTime<Utc>| TrafficRecord {
        pipeline_name: pipeline_name.to_string(),
        timestamp,
        views: 0,
        views_uniques: 0,
        clones: 0,
        clones_uniques: 0,
    };

    let mut by_timestamp: BTreeMap<DateTime<Utc>, TrafficRecord> = BTreeMap::new();

    for point in views {
        let record = by_timestamp
            .entry(point.timestamp)
            .or_insert_with(|| blank(point.timestamp));
        record.views = point.count;
        record.views_uniques = point.uniques;
    }

    for point in clones {
        let record = by_timestamp
            .entry(point.timestamp)
            .or_insert_with(|| blank(point.timestamp));
        record.clones = point.count;
        record.clones_uniques = point.uniques;
    }

    by_timestamp.into_values().collect()
}

/// Collect traffic records for the selected repositories.
///
/// A single repository's failure (permission, not-found, exhausted retries)
/// is logged and skipped; only rate-limit exhaustion aborts.
pub async fn collect_traffic(
    client: &GithubClient,
    org: &str,
    repos: &[OrgRepo],
    options: &TrafficOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<(Vec<TrafficRecord>, DomainOutcome), GithubError> {
    let selected = select_repos(repos, options, Utc::now());
    tracing::info!(
        selected = selected.len(),
        total = repos.len(),
        "collecting traffic stats"
    );
    emit(
        on_progress,
        CollectProgress::DomainStarted {
            domain: DOMAIN,
            entities: selected.len(),
        },
    );

    let mut records = Vec::new();
    let mut outcome = DomainOutcome::new(DOMAIN);

    for repo in selected {
        let views_path = format!("/repos/{org}/{}/traffic/views", repo.name);
        let clones_path = format!("/repos/{org}/{}/traffic/clones", repo.name);

        let fetched = async {
            let views: TrafficViews = client.fetch_one(&views_path).await?;
            let clones: TrafficClones = client.fetch_one(&clones_path).await?;
            Ok::<_, GithubError>((views, clones))
        }
        .await;

        let (views, clones) = match fetched {
            Ok(pair) => pair,
            Err(err) if err.is_throttled() => return Err(err),
            Err(err) => {
                // Traffic data needs push access; private or transferred
                // repos routinely 403/404 here.
                tracing::info!(repo = %repo.name, error = %err, "skipping traffic data");
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

        records.extend(merge_traffic(&repo.name, &views.views, &clones.clones));
        outcome.succeeded += 1;
    }

    outcome.rows = records.len();
    tracing::info!(
        succeeded = outcome.succeeded,
        skipped = outcome.skipped,
        rows = outcome.rows,
        "traffic stats complete"
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

    fn repo(name: &str, updated_days_ago: i64, archived: bool, stars: u32) -> OrgRepo {
        let updated = Utc::now() - Duration::days(updated_days_ago);
        serde_json::from_value(serde_json::json!({
            "name": name,
            "created_at": "2020-01-01T00:00:00Z",
            "updated_at": updated.to_rfc3339(),
            "stargazers_count": stars,
            "archived": archived,
        }))
        .expect("repo fixture")
    }

    fn point(ts: &str, count: u64, uniques: u64) -> TrafficPoint {
        TrafficPoint {
            timestamp: ts.parse().expect("timestamp"),
            count,
            uniques,
        }
    }

    #[test]
    fn select_repos_applies_the_activity_window() {
        let repos = vec![
            repo("archived", 5, true, 500),
            repo("dormant", 200, false, 400),
            repo("active", 10, false, 50),
        ];
        let options = TrafficOptions::default();

        let selected = select_repos(&repos, &options, Utc::now());
        let names: Vec<&str> = selected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["active"]);
    }

    #[test]
    fn select_repos_caps_to_top_stars() {
        let repos = vec![
            repo("small", 1, false, 5),
            repo("big", 1, false, 900),
            repo("mid", 1, false, 100),
        ];
        let options = TrafficOptions {
            max_repos: Some(2),
            ..TrafficOptions::default()
        };

        let selected = select_repos(&repos, &options, Utc::now());
        let names: Vec<&str> = selected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["big", "mid"]);
    }

    #[test]
    fn merge_traffic_unions_timestamps_with_zero_fill() {
        let a = "2025-03-01T00:00:00Z";
        let b = "2025-03-02T00:00:00Z";
        let c = "2025-03-03T00:00:00Z";
        let views = vec![point(a, 10, 4), point(b, 20, 8)];
        let clones = vec![point(b, 3, 2), point(c, 7, 5)];

        let merged = merge_traffic("rnaseq", &views, &clones);
        assert_eq!(merged.len(), 3);

        assert_eq!(merged[0].timestamp, a.parse::<DateTime<Utc>>().unwrap());
        assert_eq!((merged[0].views, merged[0].clones), (10, 0));
        assert_eq!((merged[1].views, merged[1].clones), (20, 3));
        assert_eq!((merged[1].views_uniques, merged[1].clones_uniques), (8, 2));
        assert_eq!((merged[2].views, merged[2].clones), (0, 7));
        assert_eq!(merged[2].views_uniques, 0);
    }

    #[tokio::test]
    async fn collect_traffic_skips_forbidden_repos_and_keeps_going() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{ROOT}/repos/nf-core/open/traffic/views"),
            200,
            r#"{"count":10,"uniques":4,"views":[{"timestamp":"2025-03-01T00:00:00Z","count":10,"uniques":4}]}"#,
        );
        transport.push_json(
            format!("{ROOT}/repos/nf-core/open/traffic/clones"),
            200,
            r#"{"count":0,"uniques":0,"clones":[]}"#,
        );
        // Traffic requires push access: this one 403s without quota headers.
        transport.push_json(format!("{ROOT}/repos/nf-core/locked/traffic/views"), 403, "{}");

        let repos = vec![repo("locked", 1, false, 100), repo("open", 1, false, 10)];
        let client = test_client(transport);

        let (records, outcome) = collect_traffic(
            &client,
            "nf-core",
            &repos,
            &TrafficOptions::default(),
            None,
        )
        .await
        .expect("collect");

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pipeline_name, "open");
        assert_eq!(records[0].views, 10);
    }

    #[tokio::test]
    async fn collect_traffic_aborts_on_rate_limit_exhaustion() {
        let transport = MockTransport::new();
        transport.push_response(
            crate::http::HttpMethod::Get,
            format!("{ROOT}/repos/nf-core/only/traffic/views"),
            crate::http::HttpResponse {
                status: 403,
                headers: vec![("X-RateLimit-Remaining".to_string(), "0".to_string())],
                body: Vec::new(),
            },
        );

        let repos = vec![repo("only", 1, false, 1)];
        let client = test_client(transport);

        let err = collect_traffic(
            &client,
            "nf-core",
            &repos,
            &TrafficOptions::default(),
            None,
        )
        .await
        .expect_err("throttled");
        assert!(err.is_throttled());
    }
}
