//! Configuration file support for pipestats.
//!
//! Configuration is loaded with the following precedence (highest to
//! lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `PIPESTATS_`, e.g.
//!    `PIPESTATS_GITHUB_TOKEN`)
//! 3. Config file (~/.config/pipestats/config.toml or ./pipestats.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."      # or use PIPESTATS_GITHUB_TOKEN
//! org = "nf-core"
//!
//! [slack]
//! token = "xoxp-..."     # admin user token, or use PIPESTATS_SLACK_TOKEN
//!
//! [collect]
//! active_within_days = 180
//! max_traffic_repos = 30
//! comment_quota_floor = 500
//! run_quota_floor = 100
//! requests_per_second = 10
//!
//! [state]
//! path = "~/.local/state/pipestats/checkpoints.json"  # default
//!
//! [output]
//! dir = "./data"
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use pipestats::collect::CollectOptions;
use pipestats::collect::issues::IssueOptions;
use pipestats::collect::traffic::TrafficOptions;
use pipestats::ratelimit::quotas;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GithubConfig,
    pub slack: SlackConfig,
    pub collect: CollectConfig,
    pub state: StateConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// GitHub API token. Can also be set via PIPESTATS_GITHUB_TOKEN.
    pub token: Option<String>,
    /// Organization to collect from.
    pub org: String,
    /// Published pipeline-name list used to classify the catalog.
    pub pipeline_names_url: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            org: "nf-core".to_string(),
            pipeline_names_url: None,
        }
    }
}

/// Slack configuration. The billing view needs an admin user token; bot
/// tokens are refused by the API.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Slack admin user token. Can also be set via PIPESTATS_SLACK_TOKEN.
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Traffic: only repos updated within this many days.
    pub active_within_days: i64,
    /// Traffic: cap to the top N repos by stars.
    pub max_traffic_repos: Option<usize>,
    /// Traffic: disable the activity filter entirely.
    pub all_repos: bool,
    /// Quota floor below which comment fetching is suppressed.
    pub comment_quota_floor: u32,
    /// Quota floor below which the run stops between collectors.
    pub run_quota_floor: u32,
    /// Proactive request pacing.
    pub requests_per_second: u32,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            active_within_days: 180,
            max_traffic_repos: Some(30),
            all_repos: false,
            comment_quota_floor: quotas::COMMENT_QUOTA_FLOOR,
            run_quota_floor: quotas::RUN_QUOTA_FLOOR,
            requests_per_second: quotas::DEFAULT_RPS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Checkpoint file path. Defaults to the XDG state directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one NDJSON file per domain.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "pipestats") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("pipestats.toml");
        if local_config.exists() {
            tracing::debug!("loading config from ./pipestats.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("PIPESTATS")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("failed to parse configuration, using defaults: {e}");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("failed to load configuration, using defaults: {e}");
                Config::default()
            }
        }
    }

    /// Checkpoint file path, defaulting to the XDG state directory.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        if let Some(path) = &self.state.path {
            return path.clone();
        }
        ProjectDirs::from("", "", "pipestats")
            .map(|dirs| dirs.state_dir().unwrap_or(dirs.data_dir()).join("checkpoints.json"))
            .unwrap_or_else(|| PathBuf::from("checkpoints.json"))
    }

    /// Output directory for NDJSON records.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Assemble the run-scoped options object from this configuration.
    #[must_use]
    pub fn collect_options(&self) -> CollectOptions {
        let mut options = CollectOptions::new(self.github.org.clone());
        if let Some(url) = &self.github.pipeline_names_url {
            options.pipeline_names_url = url.clone();
        }
        options.traffic = TrafficOptions {
            only_active: !self.collect.all_repos,
            active_within: chrono::Duration::days(self.collect.active_within_days),
            max_repos: self.collect.max_traffic_repos,
        };
        options.issues = IssueOptions {
            comment_quota_floor: self.collect.comment_quota_floor,
        };
        options.run_quota_floor = self.collect.run_quota_floor;
        options
    }
}
