//! Per-entity checkpoints and the change-detection policy.
//!
//! A checkpoint maps `(domain, entity_key)` to the freshness signal last
//! seen for that entity, plus whatever auxiliary fields the domain chose to
//! cache alongside it (for issues: the first-response fields, which are
//! expensive to recompute). The change detector compares the cheap current
//! signal against the checkpoint to decide whether the expensive follow-up
//! fetch is needed at all.
//!
//! Checkpoints are the only state that survives between runs. Entities are
//! never deleted; stale ones simply stop being updated.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ratelimit::RateLimitStatus;

/// A cheap, comparable proxy for "has this entity changed".
///
/// Compared only for equality, never interpreted semantically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FreshnessSignal {
    Count(u64),
    Sha(String),
    Timestamp(DateTime<Utc>),
}

/// Last-seen state for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub signal: FreshnessSignal,
    /// Auxiliary fields cached by the owning collector; opaque here.
    #[serde(default)]
    pub cached: serde_json::Value,
}

impl CheckpointRecord {
    #[must_use]
    pub fn new(signal: FreshnessSignal, cached: serde_json::Value) -> Self {
        Self { signal, cached }
    }
}

/// All checkpoints for one domain, keyed by entity.
pub type DomainCheckpoints = BTreeMap<String, CheckpointRecord>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Process-external key-value checkpoint surviving between runs.
///
/// Access is read-modify-write within a single run; concurrent runs against
/// the same store must be serialized externally.
pub trait StateStore {
    /// Mutable access to one domain's checkpoint mapping.
    fn domain(&mut self, name: &str) -> &mut DomainCheckpoints;

    /// Flush all domains to the backing storage.
    fn persist(&mut self) -> Result<(), StateError>;
}

/// In-memory store for tests and dry runs; `persist` is a no-op.
#[derive(Debug, Default)]
pub struct MemoryStore {
    domains: BTreeMap<String, DomainCheckpoints>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn domain(&mut self, name: &str) -> &mut DomainCheckpoints {
        self.domains.entry(name.to_string()).or_default()
    }

    fn persist(&mut self) -> Result<(), StateError> {
        Ok(())
    }
}

/// JSON-file-backed store: one file holding every domain's checkpoints.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    domains: BTreeMap<String, DomainCheckpoints>,
}

impl JsonFileStore {
    /// Open a store at `path`, starting empty when the file does not exist
    /// yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let domains = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, domains })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn domain(&mut self, name: &str) -> &mut DomainCheckpoints {
        self.domains.entry(name.to_string()).or_default()
    }

    fn persist(&mut self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash mid-write cannot corrupt the
        // previous run's checkpoints.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.domains)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Decides, per entity, whether the expensive follow-up fetch is needed.
///
/// Also carries the run-global quota gate: once the remaining quota drops
/// below the configured floor, refetching is suppressed for the rest of the
/// run regardless of per-entity signals, reserving quota for the lighter
/// collectors still to come.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    suppressed: bool,
}

impl ChangeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress refetching when the quota is below `floor`. Returns true
    /// when suppression kicked in.
    pub fn gate_on_quota(&mut self, status: &RateLimitStatus, floor: u32) -> bool {
        if status.is_below(floor) {
            tracing::warn!(
                remaining = status.remaining,
                floor,
                "quota below floor, suppressing expensive refetches for this run"
            );
            self.suppressed = true;
        }
        self.suppressed
    }

    #[must_use]
    pub fn refetch_suppressed(&self) -> bool {
        self.suppressed
    }

    /// True when `entity_key` was never seen, or its signal changed since
    /// the checkpoint. False under global suppression.
    #[must_use]
    pub fn should_refetch(
        &self,
        checkpoints: &DomainCheckpoints,
        entity_key: &str,
        current: &FreshnessSignal,
    ) -> bool {
        if self.suppressed {
            return false;
        }
        match checkpoints.get(entity_key) {
            None => true,
            Some(record) => record.signal != *current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(remaining: u32) -> RateLimitStatus {
        RateLimitStatus {
            remaining,
            limit: 5000,
            reset_at: Utc::now(),
        }
    }

    #[test]
    fn unseen_entities_are_refetched() {
        let detector = ChangeDetector::new();
        let checkpoints = DomainCheckpoints::new();
        assert!(detector.should_refetch(&checkpoints, "rnaseq#1", &FreshnessSignal::Count(5)));
    }

    #[test]
    fn unchanged_signal_skips_and_changed_signal_refetches() {
        let detector = ChangeDetector::new();
        let mut checkpoints = DomainCheckpoints::new();
        checkpoints.insert(
            "rnaseq#1".to_string(),
            CheckpointRecord::new(FreshnessSignal::Count(5), serde_json::Value::Null),
        );

        assert!(!detector.should_refetch(&checkpoints, "rnaseq#1", &FreshnessSignal::Count(5)));
        assert!(detector.should_refetch(&checkpoints, "rnaseq#1", &FreshnessSignal::Count(6)));
    }

    #[test]
    fn should_refetch_is_idempotent_without_checkpoint_updates() {
        let detector = ChangeDetector::new();
        let mut checkpoints = DomainCheckpoints::new();
        checkpoints.insert(
            "repo".to_string(),
            CheckpointRecord::new(
                FreshnessSignal::Sha("abc".to_string()),
                serde_json::Value::Null,
            ),
        );

        let signal = FreshnessSignal::Sha("def".to_string());
        let first = detector.should_refetch(&checkpoints, "repo", &signal);
        let second = detector.should_refetch(&checkpoints, "repo", &signal);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn signals_of_different_kinds_never_compare_equal() {
        let detector = ChangeDetector::new();
        let mut checkpoints = DomainCheckpoints::new();
        checkpoints.insert(
            "e".to_string(),
            CheckpointRecord::new(FreshnessSignal::Count(0), serde_json::Value::Null),
        );
        assert!(detector.should_refetch(
            &checkpoints,
            "e",
            &FreshnessSignal::Sha("0".to_string())
        ));
    }

    #[test]
    fn quota_gate_suppresses_all_refetches() {
        let mut detector = ChangeDetector::new();
        assert!(!detector.gate_on_quota(&quota(2000), 500));
        assert!(!detector.refetch_suppressed());

        assert!(detector.gate_on_quota(&quota(120), 500));
        assert!(detector.refetch_suppressed());

        // Suppression is sticky for the remainder of the run.
        assert!(detector.gate_on_quota(&quota(5000), 500));

        let checkpoints = DomainCheckpoints::new();
        assert!(!detector.should_refetch(&checkpoints, "new", &FreshnessSignal::Count(1)));
    }

    #[test]
    fn memory_store_keeps_domains_separate() {
        let mut store = MemoryStore::new();
        store.domain("issues").insert(
            "a#1".to_string(),
            CheckpointRecord::new(FreshnessSignal::Count(1), serde_json::Value::Null),
        );
        assert!(store.domain("traffic").is_empty());
        assert_eq!(store.domain("issues").len(), 1);
        store.persist().expect("no-op persist");
    }

    #[test]
    fn json_file_store_round_trips_checkpoints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("checkpoints.json");

        let mut store = JsonFileStore::open(&path).expect("open empty");
        store.domain("issues").insert(
            "rnaseq#7".to_string(),
            CheckpointRecord::new(
                FreshnessSignal::Count(5),
                serde_json::json!({"first_response_seconds": 42.0, "first_responder": "ada"}),
            ),
        );
        store.persist().expect("persist");

        let mut reopened = JsonFileStore::open(&path).expect("reopen");
        let record = reopened
            .domain("issues")
            .get("rnaseq#7")
            .cloned()
            .expect("record survives");
        assert_eq!(record.signal, FreshnessSignal::Count(5));
        assert_eq!(record.cached["first_responder"], "ada");
    }

    #[test]
    fn freshness_signal_serde_is_stable() {
        let signal = FreshnessSignal::Timestamp(
            DateTime::parse_from_rfc3339("2025-05-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let json = serde_json::to_string(&signal).unwrap();
        let back: FreshnessSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(signal, back);
    }
}
