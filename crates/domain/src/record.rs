//! Per-document tracking record and its status lifecycle.

use crate::primitives::{ContentHash, DocumentKey, DocumentPath, SegmentKey, SourceTag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing state of a tracked document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Sighted but not yet (re)processed.
    Pending,
    /// Embedded and synchronized; `segment_keys` mirrors the vector store.
    Processed,
    /// Processing failed; retried on the next run.
    Failed,
}

impl DocumentStatus {
    /// Stable string form used in storage and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "pending" => Some(Self::Pending),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Durable tracking-store row for one source document.
///
/// Invariant: once `status` is [`DocumentStatus::Processed`], `segment_keys`
/// exactly equals the keys present in the vector store for this document.
/// The synchronizer is the only writer of `segment_keys` and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Data source the document belongs to.
    pub source_tag: SourceTag,
    /// Relative path within the source root.
    pub path: DocumentPath,
    /// Last-observed modification time of the underlying file (ms since epoch).
    pub modified_at_ms: u64,
    /// Digest of the raw document bytes at last observation.
    pub content_hash: ContentHash,
    /// Vector-store keys produced at the last successful processing, in
    /// chunk order.
    pub segment_keys: Vec<SegmentKey>,
    /// Processing state.
    pub status: DocumentStatus,
    /// Time of the last successful processing (ms since epoch).
    pub last_processed_at_ms: Option<u64>,
    /// Consecutive processing failures since the last success.
    pub failure_count: u32,
}

impl DocumentRecord {
    /// Create a fresh record for a newly sighted document.
    #[must_use]
    pub const fn new_pending(
        source_tag: SourceTag,
        path: DocumentPath,
        modified_at_ms: u64,
        content_hash: ContentHash,
    ) -> Self {
        Self {
            source_tag,
            path,
            modified_at_ms,
            content_hash,
            segment_keys: Vec::new(),
            status: DocumentStatus::Pending,
            last_processed_at_ms: None,
            failure_count: 0,
        }
    }

    /// Composite identity of this record.
    #[must_use]
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.source_tag.clone(), self.path.clone())
    }

    /// Record a successful embed + sync cycle.
    pub fn mark_processed(&mut self, segment_keys: Vec<SegmentKey>, processed_at_ms: u64) {
        self.segment_keys = segment_keys;
        self.status = DocumentStatus::Processed;
        self.last_processed_at_ms = Some(processed_at_ms);
        self.failure_count = 0;
    }

    /// Record a processing failure, keeping the previous segment keys.
    ///
    /// The keys stay untouched so a later removal can still clean up the
    /// vectors from the last successful run.
    pub fn mark_failed(&mut self) {
        self.status = DocumentStatus::Failed;
        self.failure_count = self.failure_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DocumentRecord {
        let source_tag = SourceTag::parse("vosdroits").expect("tag");
        let path = DocumentPath::parse("F100.xml").expect("path");
        DocumentRecord::new_pending(
            source_tag,
            path,
            1_000,
            ContentHash::compute(b"payload"),
        )
    }

    #[test]
    fn new_records_start_pending() {
        let record = record();
        assert_eq!(record.status, DocumentStatus::Pending);
        assert!(record.segment_keys.is_empty());
        assert_eq!(record.failure_count, 0);
        assert_eq!(record.last_processed_at_ms, None);
    }

    #[test]
    fn mark_processed_resets_failures() {
        let mut record = record();
        record.mark_failed();
        record.mark_failed();
        assert_eq!(record.failure_count, 2);

        let keys = vec![SegmentKey::derive(&record.source_tag, &record.path, 0)];
        record.mark_processed(keys.clone(), 2_000);

        assert_eq!(record.status, DocumentStatus::Processed);
        assert_eq!(record.segment_keys, keys);
        assert_eq!(record.failure_count, 0);
        assert_eq!(record.last_processed_at_ms, Some(2_000));
    }

    #[test]
    fn mark_failed_keeps_previous_segment_keys() {
        let mut record = record();
        let keys = vec![SegmentKey::derive(&record.source_tag, &record.path, 0)];
        record.mark_processed(keys.clone(), 2_000);

        record.mark_failed();
        assert_eq!(record.status, DocumentStatus::Failed);
        assert_eq!(record.segment_keys, keys);
        assert_eq!(record.failure_count, 1);
    }

    #[test]
    fn status_string_round_trips() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("unknown"), None);
    }
}
