//! The `report` command: aggregate collected records into the trust-score
//! report.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;

use pipestats::collect::records::{CatalogRecord, IssueRecord};
use pipestats::collect::{catalog, issues};
use pipestats::report::{aggregate, score_pipelines};

use crate::config::Config;

#[derive(Debug, Clone, clap::Args)]
pub struct ReportArgs {
    /// Directory holding the collected NDJSON records
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Report output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .map_err(|e| format!("{}:{}: {e}", path.display(), idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

pub async fn run(config: &Config, args: ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = args.data_dir.clone().unwrap_or_else(|| config.output_dir());

    let catalog_records: Vec<CatalogRecord> =
        read_ndjson(&data_dir.join(format!("{}.ndjson", catalog::DOMAIN)))?;
    let issue_records: Vec<IssueRecord> =
        read_ndjson(&data_dir.join(format!("{}.ndjson", issues::DOMAIN)))?;
    tracing::info!(
        pipelines = catalog_records.len(),
        issues = issue_records.len(),
        "loaded collected records"
    );

    let rows = aggregate(&catalog_records, &issue_records);
    let scored = score_pipelines(&rows, Utc::now());

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| data_dir.join("trust_report.json"));
    fs::write(&output, serde_json::to_vec_pretty(&scored)?)?;

    for pipeline in &scored {
        tracing::info!(
            pipeline = %pipeline.pipeline_name,
            status = ?pipeline.status,
            score = pipeline.trust_score,
            "scored pipeline"
        );
    }
    tracing::info!(pipelines = scored.len(), output = %output.display(), "trust report written");
    Ok(())
}
