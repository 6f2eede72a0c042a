//! Domain collectors and the sequential run orchestration.
//!
//! Collectors run one after another, cheapest first, so the shared quota
//! budget can be checked and reserved between them: the member count costs
//! a handful of requests, per-issue comment fetching can cost thousands.
//! One request is in flight at a time; the only suspension is the backoff
//! sleep inside the request policy.

use serde::Serialize;
use thiserror::Error;

use crate::checkpoint::{StateError, StateStore};
use crate::github::types::OrgRepo;
use crate::github::{GithubClient, GithubError};

pub mod catalog;
pub mod citations;
pub mod contributors;
pub mod issues;
pub mod members;
mod progress;
pub mod records;
pub mod traffic;

pub use progress::{CollectProgress, ProgressCallback, emit};

use issues::IssueOptions;
use traffic::TrafficOptions;

/// Published pipeline-name list used to classify the catalog.
pub const DEFAULT_PIPELINE_NAMES_URL: &str =
    "https://raw.githubusercontent.com/nf-core/website/main/public/pipeline_names.json";

/// Per-domain outcome of one collection run.
#[derive(Debug, Default)]
pub struct DomainOutcome {
    pub domain: &'static str,
    pub rows: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl DomainOutcome {
    #[must_use]
    pub fn new(domain: &'static str) -> Self {
        Self {
            domain,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Github(#[from] GithubError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("record sink error: {0}")]
    Sink(#[from] std::io::Error),

    #[error("record encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where normalized records go. Ownership of the records passes to the
/// downstream load step; the collection logic retains nothing.
pub trait RecordSink {
    fn write(&mut self, domain: &'static str, record: serde_json::Value) -> std::io::Result<()>;
}

/// Sink collecting records in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: std::collections::BTreeMap<&'static str, Vec<serde_json::Value>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, domain: &'static str, record: serde_json::Value) -> std::io::Result<()> {
        self.records.entry(domain).or_default().push(record);
        Ok(())
    }
}

fn write_records<T: Serialize, K: RecordSink>(
    sink: &mut K,
    domain: &'static str,
    records: &[T],
) -> Result<(), CollectError> {
    for record in records {
        sink.write(domain, serde_json::to_value(record)?)?;
    }
    Ok(())
}

/// The GitHub-backed domains, cheapest first. The run always executes in
/// this order regardless of how the selection was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GithubResource {
    Members,
    Catalog,
    Contributors,
    Traffic,
    Issues,
}

impl GithubResource {
    pub const CHEAPEST_FIRST: [GithubResource; 5] = [
        GithubResource::Members,
        GithubResource::Catalog,
        GithubResource::Contributors,
        GithubResource::Traffic,
        GithubResource::Issues,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            GithubResource::Members => members::DOMAIN,
            GithubResource::Catalog => catalog::DOMAIN,
            GithubResource::Contributors => contributors::DOMAIN,
            GithubResource::Traffic => traffic::DOMAIN,
            GithubResource::Issues => issues::DOMAIN,
        }
    }
}

/// Configuration for one GitHub collection run, passed in explicitly and
/// scoped to that run.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub org: String,
    pub pipeline_names_url: String,
    pub traffic: TrafficOptions,
    pub issues: IssueOptions,
    /// Minimum remaining quota required before starting another collector.
    pub run_quota_floor: u32,
}

impl CollectOptions {
    #[must_use]
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            pipeline_names_url: DEFAULT_PIPELINE_NAMES_URL.to_string(),
            traffic: TrafficOptions::default(),
            issues: IssueOptions::default(),
            run_quota_floor: crate::ratelimit::quotas::RUN_QUOTA_FLOOR,
        }
    }
}

/// Per-resource results of a run, preferred over all-or-nothing failure.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<DomainOutcome>,
    /// Set when the run stopped before all requested domains ran (quota
    /// floor reached).
    pub stopped_early: Option<String>,
}

impl RunSummary {
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows).sum()
    }
}

/// Run the selected GitHub collectors sequentially.
///
/// The quota is checked between collectors; dropping below the floor stops
/// the run early with a summary. Rate-limit exhaustion mid-collector aborts
/// the whole run (after persisting checkpoints, which is the resume
/// mechanism for the next scheduled run).
pub async fn run_github<S: StateStore, K: RecordSink>(
    client: &GithubClient,
    options: &CollectOptions,
    store: &mut S,
    sink: &mut K,
    selected: &[GithubResource],
    on_progress: Option<&ProgressCallback>,
) -> Result<RunSummary, CollectError> {
    let org = options.org.as_str();

    client.check_quota(options.run_quota_floor).await?;

    let repo_set = client
        .fetch_all::<OrgRepo>(&format!("/orgs/{org}/repos"))
        .await?
        .into_result_set();
    if let Some(partial) = &repo_set.partial {
        tracing::warn!(failed_url = %partial.url, "repository listing incomplete");
    }
    let repos = repo_set.items;
    tracing::info!(org = %org, repos = repos.len(), "fetched organization repositories");
    if repos.is_empty() {
        tracing::warn!(org = %org, "no repositories found; check the organization name and token scope");
    }

    let mut summary = RunSummary::default();

    for resource in GithubResource::CHEAPEST_FIRST {
        if !selected.contains(&resource) {
            continue;
        }

        let status = client.check_quota(options.run_quota_floor).await?;
        if status.is_below(options.run_quota_floor) {
            let reason = format!(
                "quota below floor before {} ({} remaining)",
                resource.name(),
                status.remaining
            );
            tracing::warn!(reason = %reason, "stopping run early; next scheduled run resumes via checkpoints");
            emit(
                on_progress,
                CollectProgress::QuotaLow {
                    remaining: status.remaining,
                    floor: options.run_quota_floor,
                },
            );
            summary.stopped_early = Some(reason);
            break;
        }

        tracing::info!(resource = resource.name(), "processing resource");
        let result = match resource {
            GithubResource::Members => {
                match members::collect_members(client, org, &repos, on_progress).await {
                    Ok((records, outcome)) => {
                        write_records(sink, members::DOMAIN, &records)?;
                        Ok(outcome)
                    }
                    Err(e) => Err(e),
                }
            }
            GithubResource::Catalog => {
                match catalog::collect_catalog(
                    client,
                    org,
                    &repos,
                    &options.pipeline_names_url,
                    on_progress,
                )
                .await
                {
                    Ok((records, outcome)) => {
                        write_records(sink, catalog::DOMAIN, &records)?;
                        Ok(outcome)
                    }
                    Err(e) => Err(e),
                }
            }
            GithubResource::Contributors => {
                match contributors::collect_contributors(client, org, &repos, on_progress).await {
                    Ok((records, outcome)) => {
                        write_records(sink, contributors::DOMAIN, &records)?;
                        Ok(outcome)
                    }
                    Err(e) => Err(e),
                }
            }
            GithubResource::Traffic => {
                match traffic::collect_traffic(client, org, &repos, &options.traffic, on_progress)
                    .await
                {
                    Ok((records, outcome)) => {
                        write_records(sink, traffic::DOMAIN, &records)?;
                        Ok(outcome)
                    }
                    Err(e) => Err(e),
                }
            }
            GithubResource::Issues => {
                match issues::collect_issues(
                    client,
                    org,
                    &repos,
                    store,
                    &options.issues,
                    on_progress,
                )
                .await
                {
                    Ok((records, outcome)) => {
                        write_records(sink, issues::DOMAIN, &records)?;
                        Ok(outcome)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    resource = outcome.domain,
                    rows = outcome.rows,
                    "resource completed"
                );
                summary.outcomes.push(outcome);
            }
            Err(err) if err.is_throttled() => {
                // Deliberate whole-run abort: checkpoints are persisted so
                // the next scheduled run picks up where this one stopped.
                emit(
                    on_progress,
                    CollectProgress::RunAborted {
                        reason: err.to_string(),
                    },
                );
                store.persist()?;
                return Err(err.into());
            }
            Err(err) => {
                tracing::error!(resource = resource.name(), error = %err, "resource failed, continuing with next");
                let mut outcome = DomainOutcome::new(resource.name());
                outcome.errors.push(err.to_string());
                summary.outcomes.push(outcome);
            }
        }
    }

    store.persist()?;

    tracing::info!(
        total_rows = summary.total_rows(),
        resources = summary.outcomes.len(),
        stopped_early = summary.stopped_early.is_some(),
        "collection run complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::checkpoint::MemoryStore;
    use crate::http::{HttpMethod, HttpResponse, MockTransport};
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

    fn options() -> CollectOptions {
        let mut options = CollectOptions::new("nf-core");
        options.pipeline_names_url = format!("{ROOT}/names.json");
        options
    }

    fn push_quota(transport: &MockTransport, remaining: u32) {
        transport.push_json(
            format!("{ROOT}/rate_limit"),
            200,
            &format!(
                r#"{{"resources":{{"core":{{"limit":5000,"remaining":{remaining},"reset":1700000000}}}}}}"#
            ),
        );
    }

    fn push_repos(transport: &MockTransport) {
        transport.push_json(
            format!("{ROOT}/orgs/nf-core/repos"),
            200,
            r#"[{"name":"rnaseq","created_at":"2020-01-01T00:00:00Z","updated_at":"2025-06-01T00:00:00Z","stargazers_count":10}]"#,
        );
    }

    #[tokio::test]
    async fn run_executes_selected_resources_and_writes_records() {
        let transport = MockTransport::new();
        push_quota(&transport, 4000);
        push_repos(&transport);
        transport.push_json(
            format!("{ROOT}/orgs/nf-core/members"),
            200,
            r#"[{"login":"ada"},{"login":"bob"}]"#,
        );

        let client = test_client(transport);
        let mut store = MemoryStore::new();
        let mut sink = MemorySink::new();

        let summary = run_github(
            &client,
            &options(),
            &mut store,
            &mut sink,
            &[GithubResource::Members],
            None,
        )
        .await
        .expect("run");

        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.total_rows(), 1);
        assert!(summary.stopped_early.is_none());

        let member_records = sink.records.get(members::DOMAIN).expect("records written");
        assert_eq!(member_records.len(), 1);
        assert_eq!(member_records[0]["num_members"], 2);
    }

    #[tokio::test]
    async fn run_stops_early_when_quota_is_below_the_floor() {
        let transport = MockTransport::new();
        // Initial check passes, the per-resource check sees a drained quota.
        transport.push_json(
            format!("{ROOT}/rate_limit"),
            200,
            r#"{"resources":{"core":{"limit":5000,"remaining":2000,"reset":1700000000}}}"#,
        );
        transport.push_json(
            format!("{ROOT}/rate_limit"),
            200,
            r#"{"resources":{"core":{"limit":5000,"remaining":40,"reset":1700000000}}}"#,
        );
        push_repos(&transport);

        let client = test_client(transport.clone());
        let mut store = MemoryStore::new();
        let mut sink = MemorySink::new();

        let summary = run_github(
            &client,
            &options(),
            &mut store,
            &mut sink,
            &[GithubResource::Members, GithubResource::Traffic],
            None,
        )
        .await
        .expect("run");

        assert!(summary.outcomes.is_empty());
        let reason = summary.stopped_early.expect("stopped early");
        assert!(reason.contains(members::DOMAIN));
        // No member listing was attempted.
        assert_eq!(transport.request_count(&format!("{ROOT}/orgs/nf-core/members")), 0);
    }

    #[tokio::test]
    async fn a_failing_resource_does_not_abort_the_run() {
        let transport = MockTransport::new();
        push_quota(&transport, 4000);
        push_repos(&transport);
        // Members listing is forbidden for this token; catalog still runs.
        transport.push_json(format!("{ROOT}/orgs/nf-core/members"), 403, "{}");
        transport.push_json(format!("{ROOT}/names.json"), 200, r#"{"pipeline":["rnaseq"]}"#);
        transport.push_response(
            HttpMethod::Post,
            format!("{ROOT}/graphql"),
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: br#"{"data":{"organization":{"repositories":{
                    "pageInfo":{"hasNextPage":false},
                    "nodes":[{"name":"rnaseq","releases":{"totalCount":1,"nodes":[{"publishedAt":"2025-01-01T00:00:00Z"}]}}]}}}}"#
                    .to_vec(),
            },
        );

        let client = test_client(transport);
        let mut store = MemoryStore::new();
        let mut sink = MemorySink::new();

        let summary = run_github(
            &client,
            &options(),
            &mut store,
            &mut sink,
            &[GithubResource::Members, GithubResource::Catalog],
            None,
        )
        .await
        .expect("run");

        assert_eq!(summary.outcomes.len(), 2);
        assert!(!summary.outcomes[0].errors.is_empty());
        assert_eq!(summary.outcomes[1].rows, 1);
        assert!(sink.records.contains_key(catalog::DOMAIN));
    }

    #[tokio::test]
    async fn throttled_mid_run_aborts_the_whole_run() {
        let transport = MockTransport::new();
        push_quota(&transport, 4000);
        push_repos(&transport);
        transport.push_response(
            HttpMethod::Get,
            format!("{ROOT}/orgs/nf-core/members"),
            HttpResponse {
                status: 429,
                headers: vec![("Retry-After".to_string(), "3600".to_string())],
                body: Vec::new(),
            },
        );

        let client = test_client(transport);
        let mut store = MemoryStore::new();
        let mut sink = MemorySink::new();

        let err = run_github(
            &client,
            &options(),
            &mut store,
            &mut sink,
            &[GithubResource::Members, GithubResource::Catalog],
            None,
        )
        .await
        .expect_err("throttled");

        assert!(matches!(err, CollectError::Github(e) if e.is_throttled()));
        assert!(sink.records.is_empty());
    }
}
