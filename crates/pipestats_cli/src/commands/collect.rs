//! The `collect` command: run the selected collectors and write NDJSON.

use std::path::PathBuf;

use clap::ValueEnum;

use pipestats::checkpoint::JsonFileStore;
use pipestats::collect::catalog::fetch_pipeline_names;
use pipestats::collect::citations::{self, ScholarClient};
use pipestats::collect::{GithubResource, RecordSink, run_github};
use pipestats::github::GithubClient;
use pipestats::ratelimit::ApiRateLimiter;
use pipestats::slack::{self, SlackClient};

use crate::config::Config;
use crate::progress::logging_reporter;
use crate::sink::NdjsonSink;

/// Resources selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceArg {
    Members,
    Pipelines,
    Contributors,
    Traffic,
    Issues,
    Slack,
    Citations,
}

impl ResourceArg {
    fn as_github(self) -> Option<GithubResource> {
        match self {
            ResourceArg::Members => Some(GithubResource::Members),
            ResourceArg::Pipelines => Some(GithubResource::Catalog),
            ResourceArg::Contributors => Some(GithubResource::Contributors),
            ResourceArg::Traffic => Some(GithubResource::Traffic),
            ResourceArg::Issues => Some(GithubResource::Issues),
            ResourceArg::Slack | ResourceArg::Citations => None,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct CollectArgs {
    /// Resources to collect; all GitHub resources when omitted
    #[arg(long = "resource", value_enum)]
    pub resources: Vec<ResourceArg>,

    /// Organization to collect from (overrides config)
    #[arg(long)]
    pub org: Option<String>,

    /// Collect traffic for all repositories, not just recently active ones
    #[arg(long)]
    pub all_repos: bool,

    /// Cap traffic collection to the top N repositories by stars
    #[arg(long)]
    pub max_repos: Option<usize>,

    /// Checkpoint file (overrides config)
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Output directory for NDJSON records (overrides config)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

pub async fn run(config: &Config, args: CollectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let token = config
        .github
        .token
        .as_deref()
        .ok_or("GitHub token is not configured (set PIPESTATS_GITHUB_TOKEN)")?;

    let mut options = config.collect_options();
    if let Some(org) = &args.org {
        options.org = org.clone();
    }
    if args.all_repos {
        options.traffic.only_active = false;
    }
    if let Some(max) = args.max_repos {
        options.traffic.max_repos = Some(max);
    }

    let pacer = ApiRateLimiter::new(config.collect.requests_per_second);
    let client = GithubClient::new(token, Some(pacer))?;

    let state_path = args.state_file.clone().unwrap_or_else(|| config.state_path());
    let mut store = JsonFileStore::open(&state_path)?;
    tracing::info!(path = %state_path.display(), "opened checkpoint store");

    let out_dir = args.out_dir.clone().unwrap_or_else(|| config.output_dir());
    let mut sink = NdjsonSink::create(out_dir.clone())?;
    let progress = logging_reporter();

    let selected: Vec<ResourceArg> = if args.resources.is_empty() {
        vec![
            ResourceArg::Members,
            ResourceArg::Pipelines,
            ResourceArg::Contributors,
            ResourceArg::Traffic,
            ResourceArg::Issues,
        ]
    } else {
        args.resources.clone()
    };

    let github_resources: Vec<GithubResource> = selected
        .iter()
        .filter_map(|r| r.as_github())
        .collect();

    if !github_resources.is_empty() {
        let summary = run_github(
            &client,
            &options,
            &mut store,
            &mut sink,
            &github_resources,
            Some(&progress),
        )
        .await?;

        tracing::info!("=== collection summary ===");
        for outcome in &summary.outcomes {
            tracing::info!(
                resource = outcome.domain,
                rows = outcome.rows,
                succeeded = outcome.succeeded,
                skipped = outcome.skipped,
                errors = outcome.errors.len(),
                "resource summary"
            );
            for error in &outcome.errors {
                tracing::warn!(resource = outcome.domain, error = %error, "resource error");
            }
        }
        if let Some(reason) = &summary.stopped_early {
            tracing::warn!(reason = %reason, "run stopped early");
        }
        tracing::info!(total_rows = summary.total_rows(), "github collection finished");
    }

    if selected.contains(&ResourceArg::Slack) {
        let slack_token = config
            .slack
            .token
            .as_deref()
            .ok_or("Slack token is not configured (set PIPESTATS_SLACK_TOKEN)")?;
        let slack_client = SlackClient::new(slack_token)?;
        let (records, outcome) =
            slack::collect_workspace_stats(&slack_client, Some(&progress)).await?;
        for record in &records {
            sink.write(slack::DOMAIN, serde_json::to_value(record)?)?;
        }
        tracing::info!(rows = outcome.rows, "slack collection finished");
    }

    if selected.contains(&ResourceArg::Citations) {
        let names = fetch_pipeline_names(&client, &options.pipeline_names_url).await?;
        let scholar = ScholarClient::new()?;
        let (records, outcome) = citations::collect_citations(
            &client,
            &scholar,
            &options.org,
            &names,
            Some(&progress),
        )
        .await?;
        for record in &records {
            sink.write(citations::DOMAIN, serde_json::to_value(record)?)?;
        }
        tracing::info!(
            rows = outcome.rows,
            skipped = outcome.skipped,
            "citation collection finished"
        );
    }

    sink.finish()?;
    tracing::info!(out_dir = %out_dir.display(), "records written");
    Ok(())
}
