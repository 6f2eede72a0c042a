//! Maps library progress events to tracing output.

use pipestats::collect::{CollectProgress, ProgressCallback};

/// Build the logging progress callback.
pub fn logging_reporter() -> ProgressCallback {
    Box::new(|event| match event {
        CollectProgress::DomainStarted { domain, entities } => {
            tracing::info!(domain, entities, "collector started");
        }
        CollectProgress::EntitySkipped {
            domain,
            entity,
            reason,
        } => {
            tracing::debug!(domain, entity = %entity, reason = %reason, "entity skipped");
        }
        CollectProgress::PartialResult {
            domain,
            entity,
            failed_url,
        } => {
            tracing::warn!(domain, entity = %entity, failed_url = %failed_url, "partial result");
        }
        CollectProgress::DomainComplete {
            domain,
            rows,
            succeeded,
            skipped,
        } => {
            tracing::info!(domain, rows, succeeded, skipped, "collector complete");
        }
        CollectProgress::QuotaLow { remaining, floor } => {
            tracing::warn!(remaining, floor, "quota low");
        }
        CollectProgress::RunAborted { reason } => {
            tracing::error!(reason = %reason, "run aborted");
        }
    })
}
