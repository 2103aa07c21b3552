//! Work-plan types produced by the diff engine.

use crate::primitives::{ContentHash, DocumentPath, SegmentKey, SourceTag};
use serde::{Deserialize, Serialize};

/// Classification of one document against the tracking store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present in the corpus, absent from the tracking store.
    New,
    /// Present in both with a differing content hash, or force-reprocessed
    /// after a previous failure.
    Modified,
    /// Present in both with an identical content hash.
    Unchanged,
    /// Present in the tracking store, absent from the corpus.
    Removed,
}

impl ChangeKind {
    /// Stable string form for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
            Self::Removed => "removed",
        }
    }
}

/// A document scheduled for embedding and synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDocument {
    /// Data source the document belongs to.
    pub source_tag: SourceTag,
    /// Relative path within the source root.
    pub path: DocumentPath,
    /// New or Modified.
    pub kind: ChangeKind,
    /// Fresh modification time observed during scanning (ms since epoch).
    pub modified_at_ms: u64,
    /// Fresh content hash observed during scanning.
    pub content_hash: ContentHash,
    /// Segment keys recorded at the last successful processing; stale keys
    /// not re-produced this time get deleted after the upsert.
    pub previous_segment_keys: Vec<SegmentKey>,
    /// Failure count carried over from the existing record.
    pub failure_count: u32,
}

/// A tracked document whose source file disappeared from the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedDocument {
    /// Data source the document belonged to.
    pub source_tag: SourceTag,
    /// Relative path within the source root.
    pub path: DocumentPath,
    /// Segment keys to delete from the vector store.
    pub segment_keys: Vec<SegmentKey>,
}

/// Complete plan for one run: what to process, what to remove, and how much
/// was left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPlan {
    /// New and Modified documents, in corpus order.
    pub to_process: Vec<PlannedDocument>,
    /// Documents to remove from the vector store and tracking store.
    pub to_remove: Vec<RemovedDocument>,
    /// Count of documents classified Unchanged.
    pub unchanged: usize,
    /// Segment count of unchanged documents (what a full reprocess would
    /// have re-embedded); used for compute-savings reporting.
    pub unchanged_segments: u64,
}

impl WorkPlan {
    /// Total number of planned mutations.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.to_process.len() + self.to_remove.len()
    }

    /// Returns true when the corpus matches the tracking store exactly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_process.is_empty() && self.to_remove.is_empty()
    }

    /// Count of planned documents with the given kind.
    #[must_use]
    pub fn count_of(&self, kind: ChangeKind) -> usize {
        match kind {
            ChangeKind::New | ChangeKind::Modified => self
                .to_process
                .iter()
                .filter(|document| document.kind == kind)
                .count(),
            ChangeKind::Unchanged => self.unchanged,
            ChangeKind::Removed => self.to_remove.len(),
        }
    }
}
