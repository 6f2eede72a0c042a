//! Pipestats - usage and health metrics collection for a pipeline
//! organization.
//!
//! This library implements incremental remote collection: paginated,
//! rate-limited GitHub and Slack endpoints are scraped into flat normalized
//! records for an analytical warehouse, with per-entity checkpoints so
//! repeated runs skip work that has not changed.
//!
//! # Example
//!
//! ```ignore
//! use pipestats::checkpoint::JsonFileStore;
//! use pipestats::collect::{CollectOptions, GithubResource, MemorySink, run_github};
//! use pipestats::github::GithubClient;
//!
//! let client = GithubClient::new(&token, None)?;
//! let mut store = JsonFileStore::open("checkpoints.json")?;
//! let mut sink = MemorySink::new();
//!
//! let summary = run_github(
//!     &client,
//!     &CollectOptions::new("nf-core"),
//!     &mut store,
//!     &mut sink,
//!     &GithubResource::CHEAPEST_FIRST,
//!     None,
//! )
//! .await?;
//! println!("collected {} rows", summary.total_rows());
//! ```

pub mod checkpoint;
pub mod collect;
pub mod github;
pub mod http;
pub mod ratelimit;
pub mod report;
pub mod slack;

pub use checkpoint::{
    ChangeDetector, CheckpointRecord, DomainCheckpoints, FreshnessSignal, JsonFileStore,
    MemoryStore, StateError, StateStore,
};
pub use collect::{
    CollectError, CollectOptions, CollectProgress, DomainOutcome, GithubResource, ProgressCallback,
    RecordSink, RunSummary, run_github,
};
pub use github::{GithubClient, GithubError};
pub use ratelimit::{ApiRateLimiter, RateLimitStatus, RetryPolicy};
pub use slack::{SlackClient, SlackError};
