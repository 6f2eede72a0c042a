//! Citation collector: DOIs from each pipeline's `nextflow.config`, looked
//! up against the Semantic Scholar paper endpoint.
//!
//! The scholar API is a different service with its own quota; its failures
//! never abort a run, they only skip the affected DOI.

use std::sync::{Arc, LazyLock};
use std::time::Duration as StdDuration;

use backon::Retryable;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::github::{GithubClient, GithubError};
use crate::http::{HttpRequest, HttpTransport, reqwest_transport::ReqwestTransport};
use crate::ratelimit::RetryPolicy;

use super::DomainOutcome;
use super::progress::{CollectProgress, ProgressCallback, emit};
use super::records::CitationRecord;

pub const DOMAIN: &str = "pipeline_citations";

/// Default Semantic Scholar API root.
pub const SCHOLAR_API_ROOT: &str = "https://api.semanticscholar.org/graph/v1";

const PAPER_FIELDS: &str = "title,citationCount,influentialCitationCount";

static MANIFEST_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)manifest\s*\{([^}]*(?:\{[^}]*\}[^}]*)*)\}").expect("manifest regex")
});

static DOI_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"doi\s*=\s*['"](?:https?://doi\.org/)?([0-9]+\.[0-9]+/[^'"]+)['"]"#)
        .expect("doi regex")
});

/// Extract DOIs from the `manifest` block of a `nextflow.config`.
///
/// The `doi` field may carry several comma-separated DOIs, optionally
/// prefixed with a doi.org URL.
#[must_use]
pub fn parse_dois(config_text: &str) -> Vec<String> {
    let Some(manifest) = MANIFEST_BLOCK
        .captures(config_text)
        .and_then(|c| c.get(1))
    else {
        return Vec::new();
    };

    let Some(doi_value) = DOI_FIELD.captures(manifest.as_str()).and_then(|c| c.get(1)) else {
        return Vec::new();
    };

    doi_value
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Error)]
pub enum ScholarError {
    #[error("scholar transport error: {0}")]
    Http(String),

    #[error("scholar API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("scholar decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ScholarError {
    fn is_transient(&self) -> bool {
        match self {
            ScholarError::Http(_) => true,
            ScholarError::Api { status, .. } => *status >= 500,
            ScholarError::Decode(_) => false,
        }
    }
}

/// Paper metadata as returned by the graph API.
#[derive(Debug, Clone, Deserialize)]
pub struct Paper {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "citationCount", default)]
    pub citation_count: u64,
    #[serde(rename = "influentialCitationCount", default)]
    pub influential_citation_count: u64,
}

/// Minimal Semantic Scholar client over the shared transport boundary.
#[derive(Clone)]
pub struct ScholarClient {
    transport: Arc<dyn HttpTransport>,
    api_root: String,
    retry: RetryPolicy,
}

impl ScholarClient {
    pub fn new() -> Result<Self, ScholarError> {
        let transport = ReqwestTransport::with_timeout(StdDuration::from_secs(60))
            .map_err(|e| ScholarError::Http(e.to_string()))?;
        Ok(Self::with_transport(
            SCHOLAR_API_ROOT,
            RetryPolicy::default(),
            Arc::new(transport),
        ))
    }

    #[must_use]
    pub fn with_transport(
        api_root: &str,
        retry: RetryPolicy,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            api_root: api_root.trim_end_matches('/').to_string(),
            retry,
        }
    }

    /// Look up a paper by DOI. `None` when the DOI is unknown to the index.
    pub async fn paper_by_doi(&self, doi: &str) -> Result<Option<Paper>, ScholarError> {
        let url = format!("{}/paper/DOI:{doi}?fields={PAPER_FIELDS}", self.api_root);

        let transport = Arc::clone(&self.transport);
        let op = || {
            let transport = Arc::clone(&transport);
            let url = url.clone();
            async move {
                let response = transport
                    .send(HttpRequest::get(url, Vec::new()))
                    .await
                    .map_err(|e| ScholarError::Http(e.to_string()))?;
                if response.status == 404 {
                    return Ok(None);
                }
                if !response.is_success() {
                    return Err(ScholarError::Api {
                        status: response.status,
                        message: String::from_utf8_lossy(&response.body)
                            .lines()
                            .next()
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                let paper: Paper = serde_json::from_slice(&response.body)?;
                Ok(Some(paper))
            }
        };

        op.retry(self.retry.clone().into_backoff())
            .when(|e: &ScholarError| e.is_transient())
            .notify(|err: &ScholarError, dur| {
                tracing::debug!(delay = ?dur, error = %err, "retrying scholar lookup");
            })
            .await
    }
}

pub async fn collect_citations(
    github: &GithubClient,
    scholar: &ScholarClient,
    org: &str,
    pipeline_names: &[String],
    on_progress: Option<&ProgressCallback>,
) -> Result<(Vec<CitationRecord>, DomainOutcome), GithubError> {
    tracing::info!(pipelines = pipeline_names.len(), "collecting citation stats");
    emit(
        on_progress,
        CollectProgress::DomainStarted {
            domain: DOMAIN,
            entities: pipeline_names.len(),
        },
    );

    let mut records = Vec::new();
    let mut outcome = DomainOutcome::new(DOMAIN);

    for name in pipeline_names {
        let config_text = match github.file_contents(org, name, "nextflow.config").await {
            Ok(text) => text,
            Err(err) if err.is_throttled() => return Err(err),
            Err(err) => {
                tracing::warn!(pipeline = %name, error = %err, "skipping citations, no readable nextflow.config");
                emit(
                    on_progress,
                    CollectProgress::EntitySkipped {
                        domain: DOMAIN,
                        entity: name.clone(),
                        reason: err.to_string(),
                    },
                );
                outcome.skipped += 1;
                continue;
            }
        };

        let dois = parse_dois(&config_text);
        if dois.is_empty() {
            tracing::info!(pipeline = %name, "no DOI in nextflow.config manifest");
            outcome.skipped += 1;
            continue;
        }

        let mut found_any = false;
        for doi in dois {
            match scholar.paper_by_doi(&doi).await {
                Ok(Some(paper)) => {
                    found_any = true;
                    records.push(CitationRecord {
                        pipeline_name: name.clone(),
                        timestamp: Utc::now(),
                        doi,
                        paper_title: paper.title.unwrap_or_default(),
                        citation_count: paper.citation_count,
                        influential_citation_count: paper.influential_citation_count,
                    });
                }
                Ok(None) => {
                    tracing::warn!(pipeline = %name, doi = %doi, "DOI not found in citation index");
                }
                Err(err) => {
                    tracing::warn!(pipeline = %name, doi = %doi, error = %err, "citation lookup failed");
                    outcome.errors.push(format!("{name}/{doi}: {err}"));
                }
            }
        }
        if found_any {
            outcome.succeeded += 1;
        } else {
            outcome.skipped += 1;
        }
    }

    outcome.rows = records.len();
    tracing::info!(
        succeeded = outcome.succeeded,
        skipped = outcome.skipped,
        rows = outcome.rows,
        "citation stats complete"
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

    use crate::http::MockTransport;

    const GH_ROOT: &str = "https://api.example.com";
    const S2_ROOT: &str = "https://scholar.example.com";

    fn github_client(transport: MockTransport) -> GithubClient {
        GithubClient::with_transport(
            "test-token",
            GH_ROOT,
            RetryPolicy::default().with_jitter(false),
            None,
            Arc::new(transport),
        )
        .expect("client")
    }

    fn scholar_client(transport: MockTransport) -> ScholarClient {
        ScholarClient::with_transport(
            S2_ROOT,
            RetryPolicy::default().with_jitter(false),
            Arc::new(transport),
        )
    }

    #[test]
    fn parse_dois_reads_the_manifest_block() {
        let config = r#"
            params { outdir = './results' }
            manifest {
                name        = 'nf-core/rnaseq'
                doi         = 'https://doi.org/10.1371/journal.pcbi.1012265'
                description = 'RNA sequencing'
            }
        "#;
        assert_eq!(parse_dois(config), vec!["10.1371/journal.pcbi.1012265"]);
    }

    #[test]
    fn parse_dois_splits_comma_separated_values() {
        let config = r#"manifest { doi = "10.5281/zenodo.1400710, 10.1038/s41587-020-0439-x" }"#;
        assert_eq!(
            parse_dois(config),
            vec!["10.5281/zenodo.1400710", "10.1038/s41587-020-0439-x"]
        );
    }

    #[test]
    fn parse_dois_handles_missing_manifest_or_doi() {
        assert!(parse_dois("params { foo = 1 }").is_empty());
        assert!(parse_dois("manifest { name = 'x' }").is_empty());
        // doi outside the manifest block does not count
        assert!(parse_dois("doi = '10.1/x'\nmanifest { name = 'x' }").is_empty());
    }

    #[tokio::test]
    async fn paper_lookup_maps_404_to_none() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{S2_ROOT}/paper/DOI:10.1/gone?fields={PAPER_FIELDS}"),
            404,
            "{}",
        );
        let client = scholar_client(transport);
        assert!(client.paper_by_doi("10.1/gone").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn collect_citations_emits_one_record_per_doi() {
        let gh = MockTransport::new();
        // base64 of: manifest { doi = '10.1371/journal.pcbi.1012265' }
        gh.push_json(
            format!("{GH_ROOT}/repos/nf-core/rnaseq/contents/nextflow.config"),
            200,
            r#"{"content":"bWFuaWZlc3QgeyBkb2kgPSAnMTAuMTM3MS9qb3VybmFsLnBjYmkuMTAxMjI2NScgfQ==","encoding":"base64"}"#,
        );
        gh.push_json(
            format!("{GH_ROOT}/repos/nf-core/empty/contents/nextflow.config"),
            404,
            "{}",
        );

        let s2 = MockTransport::new();
        s2.push_json(
            format!("{S2_ROOT}/paper/DOI:10.1371/journal.pcbi.1012265?fields={PAPER_FIELDS}"),
            200,
            r#"{"title":"STAR aligner benchmarks","citationCount":41,"influentialCitationCount":6}"#,
        );

        let names = vec!["rnaseq".to_string(), "empty".to_string()];
        let (records, outcome) = collect_citations(
            &github_client(gh),
            &scholar_client(s2),
            "nf-core",
            &names,
            None,
        )
        .await
        .expect("collect");

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doi, "10.1371/journal.pcbi.1012265");
        assert_eq!(records[0].citation_count, 41);
    }
}
