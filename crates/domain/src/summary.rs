//! Run summary and tracking statistics.

use crate::primitives::SourceTag;
use crate::record::DocumentStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one orchestrator invocation.
///
/// Observability only: correctness is carried by the tracking store, never by
/// the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Correlation id of the run.
    pub run_id: Box<str>,
    /// Run start (ms since epoch).
    pub started_at_ms: u64,
    /// Run end (ms since epoch).
    pub finished_at_ms: u64,
    /// Documents first sighted this run.
    pub added: usize,
    /// Documents reprocessed due to content change or prior failure.
    pub modified: usize,
    /// Documents left untouched.
    pub unchanged: usize,
    /// Documents removed from the index.
    pub removed: usize,
    /// Documents that ended the run in `failed` state.
    pub failed: usize,
    /// Chunks actually embedded this run.
    pub embedded_segments: u64,
    /// Chunks a full reprocess would have embedded (unchanged + embedded).
    pub baseline_segments: u64,
    /// Vector-store count before the run, when the store reports one.
    pub initial_vector_count: Option<u64>,
    /// Vector-store count after the run, when the store reports one.
    pub final_vector_count: Option<u64>,
    /// False when the run was aborted early; counts then reflect only
    /// committed work.
    pub completed: bool,
}

impl RunSummary {
    /// Share of embedding work skipped thanks to incremental processing,
    /// as a percentage of the baseline.
    #[must_use]
    pub fn compute_savings_percent(&self) -> f64 {
        if self.baseline_segments == 0 {
            return 0.0;
        }
        let actual = self.embedded_segments as f64;
        let baseline = self.baseline_segments as f64;
        ((1.0 - actual / baseline).max(0.0)) * 100.0
    }

    /// Wall-clock duration of the run in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.finished_at_ms.saturating_sub(self.started_at_ms)
    }
}

/// Aggregate statistics over the tracking store, for the status surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingCounts {
    /// Total tracked documents.
    pub total: u64,
    /// Documents per status.
    pub by_status: BTreeMap<DocumentStatus, u64>,
    /// Documents per source tag.
    pub by_source: BTreeMap<SourceTag, u64>,
    /// Total segments across all processed documents.
    pub total_segments: u64,
    /// Most recent successful processing time (ms since epoch).
    pub last_processed_at_ms: Option<u64>,
}
