//! Pipestats CLI - collect organization metrics and build the trust report.

mod commands;
mod config;
mod progress;
mod sink;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::collect::CollectArgs;
use crate::commands::report::ReportArgs;
use crate::config::Config;

#[derive(Parser)]
#[command(name = "pipestats")]
#[command(version)]
#[command(about = "Usage and health metrics collection for a pipeline organization")]
#[command(
    long_about = "Pipestats scrapes GitHub activity, Slack membership and citation counts \
for a pipeline organization into flat NDJSON records for an analytical \
warehouse, and computes the regulatory trust-score report over them. \
Collection is incremental: per-entity checkpoints let repeated runs skip \
anything that has not changed."
)]
#[command(after_long_help = r#"EXAMPLES
    Collect every GitHub resource:
        $ pipestats collect

    Collect only the cheap resources:
        $ pipestats collect --resource members --resource pipelines

    Collect Slack workspace stats:
        $ pipestats collect --resource slack

    Build the trust report from collected records:
        $ pipestats report

CONFIGURATION
    Pipestats reads configuration from:
      1. ~/.config/pipestats/config.toml (or $XDG_CONFIG_HOME/pipestats/config.toml)
      2. ./pipestats.toml
      3. Environment variables (PIPESTATS_* prefix)
      4. .env file in the current directory

ENVIRONMENT VARIABLES
    PIPESTATS_GITHUB_TOKEN    GitHub personal access token
    PIPESTATS_SLACK_TOKEN     Slack admin user token
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run collectors and write NDJSON records
    Collect(CollectArgs),
    /// Aggregate collected records into the trust-score report
    Report(ReportArgs),
    /// Show the current API quota
    Limits,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Collect(args) => commands::collect::run(&config, args).await,
        Commands::Report(args) => commands::report::run(&config, args).await,
        Commands::Limits => commands::limits::run(&config).await,
    }
}
