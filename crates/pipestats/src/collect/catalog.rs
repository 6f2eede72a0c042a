//! Repository catalog collector.
//!
//! Classifies the organization's repositories as pipelines or core tooling
//! against the published pipeline-name list, and enriches each entry with
//! release information. Release info for the whole organization is fetched
//! through the GraphQL connection paginator in batches, instead of one REST
//! release listing per repository.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::github::types::OrgRepo;
use crate::github::{GithubClient, GithubError};

use super::DomainOutcome;
use super::progress::{CollectProgress, ProgressCallback, emit};
use super::records::{CatalogRecord, RepoCategory};

pub const DOMAIN: &str = "pipelines";

const RELEASES_QUERY: &str = r#"query($org: String!, $after: String) {
  organization(login: $org) {
    repositories(first: 100, after: $after) {
      pageInfo { endCursor hasNextPage }
      nodes {
        name
        releases(first: 1, orderBy: {field: CREATED_AT, direction: DESC}) {
          totalCount
          nodes { publishedAt }
        }
      }
    }
  }
}"#;

/// Envelope of the published pipeline-name list.
#[derive(Debug, Deserialize)]
struct PipelineNames {
    #[serde(default)]
    pipeline: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RepoReleasesNode {
    name: String,
    releases: ReleasesConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleasesConnection {
    total_count: u64,
    #[serde(default)]
    nodes: Vec<ReleaseNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    published_at: Option<DateTime<Utc>>,
}

/// Latest release date and total release count per repository.
type ReleaseOverview = HashMap<String, (Option<DateTime<Utc>>, u64)>;

/// Fetch the published list of pipeline names.
pub async fn fetch_pipeline_names(
    client: &GithubClient,
    url: &str,
) -> Result<Vec<String>, GithubError> {
    let names: PipelineNames = client.get_json(url).await?;
    Ok(names.pipeline)
}

async fn fetch_release_overview(
    client: &GithubClient,
    org: &str,
) -> Result<ReleaseOverview, GithubError> {
    let nodes: Vec<RepoReleasesNode> = client
        .fetch_connection(
            RELEASES_QUERY,
            serde_json::json!({ "org": org }),
            &["organization", "repositories"],
        )
        .await?;

    Ok(nodes
        .into_iter()
        .map(|node| {
            let latest = node.releases.nodes.first().and_then(|r| r.published_at);
            (node.name, (latest, node.releases.total_count))
        })
        .collect())
}

/// Classify repositories and attach release info. Pure; the fetches above
/// feed it.
#[must_use]
pub fn build_catalog(
    repos: &[OrgRepo],
    pipeline_names: &[String],
    releases: &ReleaseOverview,
) -> Vec<CatalogRecord> {
    let mut records = Vec::new();

    let to_record = |repo: &OrgRepo, category: RepoCategory| {
        let (last_release_date, number_of_releases) = releases
            .get(&repo.name)
            .map(|(latest, count)| (*latest, Some(*count)))
            .unwrap_or((None, None));
        CatalogRecord {
            name: repo.name.clone(),
            description: repo.description.clone().unwrap_or_default(),
            gh_created_at: repo.created_at,
            gh_updated_at: repo.updated_at,
            gh_pushed_at: repo.pushed_at,
            stargazers_count: repo.stargazers_count,
            watchers_count: repo.watchers_count,
            forks_count: repo.forks_count,
            open_issues_count: repo.open_issues_count,
            topics: repo.topics.clone(),
            default_branch: repo.default_branch.clone(),
            archived: repo.archived,
            last_release_date,
            number_of_releases,
            category,
        }
    };

    for name in pipeline_names {
        match repos.iter().find(|repo| &repo.name == name) {
            Some(repo) => records.push(to_record(repo, RepoCategory::Pipeline)),
            None => {
                tracing::warn!(pipeline = %name, "listed pipeline has no repository in the organization");
            }
        }
    }

    for repo in repos {
        if !pipeline_names.contains(&repo.name) {
            records.push(to_record(repo, RepoCategory::Core));
        }
    }

    records
}

pub async fn collect_catalog(
    client: &GithubClient,
    org: &str,
    repos: &[OrgRepo],
    pipeline_names_url: &str,
    on_progress: Option<&ProgressCallback>,
) -> Result<(Vec<CatalogRecord>, DomainOutcome), GithubError> {
    emit(
        on_progress,
        CollectProgress::DomainStarted {
            domain: DOMAIN,
            entities: repos.len(),
        },
    );

    let mut outcome = DomainOutcome::new(DOMAIN);

    let pipeline_names = fetch_pipeline_names(client, pipeline_names_url).await?;
    tracing::info!(pipelines = pipeline_names.len(), "fetched pipeline name list");

    // Release info is enrichment; a failure here degrades the records
    // rather than failing the domain.
    let releases = match fetch_release_overview(client, org).await {
        Ok(overview) => overview,
        Err(err) if err.is_throttled() => return Err(err),
        Err(err) => {
            tracing::warn!(error = %err, "release overview unavailable, catalog will omit release info");
            outcome.errors.push(format!("release overview: {err}"));
            ReleaseOverview::new()
        }
    };

    let records = build_catalog(repos, &pipeline_names, &releases);
    outcome.succeeded = records.len();
    outcome.rows = records.len();

    tracing::info!(rows = outcome.rows, "catalog complete");
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
