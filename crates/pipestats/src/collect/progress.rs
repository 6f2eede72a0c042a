//! Progress reporting for collection runs.
//!
//! Collectors emit [`CollectProgress`] events through an optional callback;
//! the CLI maps them to tracing output. Keeping the callback optional means
//! library callers pay nothing when they don't care.

/// Callback type for receiving progress events.
pub type ProgressCallback = Box<dyn Fn(CollectProgress) + Send + Sync>;

/// Progress events emitted during a collection run.
#[derive(Debug, Clone)]
pub enum CollectProgress {
    /// A domain collector started over `entities` candidate entities.
    DomainStarted {
        domain: &'static str,
        entities: usize,
    },
    /// One entity was skipped (permission, not-found, not-ready).
    EntitySkipped {
        domain: &'static str,
        entity: String,
        reason: String,
    },
    /// A paginated fetch came back incomplete; the prefix was kept.
    PartialResult {
        domain: &'static str,
        entity: String,
        failed_url: String,
    },
    /// A domain collector finished.
    DomainComplete {
        domain: &'static str,
        rows: usize,
        succeeded: usize,
        skipped: usize,
    },
    /// Remaining quota dropped below a configured floor.
    QuotaLow { remaining: u32, floor: u32 },
    /// The run stopped before all domains ran.
    RunAborted { reason: String },
}

/// Emit an event if a callback is present.
pub fn emit(on_progress: Option<&ProgressCallback>, event: CollectProgress) {
    if let Some(callback) = on_progress {
        callback(event);
    }
}
