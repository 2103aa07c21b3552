//! Shared types for the sync run pipeline.

use corpus_sync_domain::{ContentHash, DocumentRecord, PlannedDocument, RemovedDocument};
use corpus_sync_ports::{
    CorpusEntry, CorpusPort, EmbeddingPort, LoggerPort, RunLockPort, SegmentForUpsert,
    SplitterPort, TrackingStorePort, VectorStorePort,
};
use corpus_sync_shared::{ErrorEnvelope, RetryPolicy};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Dependencies required by a sync run.
#[derive(Clone)]
pub struct SyncRunDeps {
    /// Corpus source.
    pub corpus: Arc<dyn CorpusPort>,
    /// Tracking store.
    pub tracking: Arc<dyn TrackingStorePort>,
    /// Vector store.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Embedding provider.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Text splitter.
    pub splitter: Arc<dyn SplitterPort>,
    /// Exclusive run lock.
    pub run_lock: Arc<dyn RunLockPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Input parameters for a sync run.
#[derive(Debug, Clone, Copy)]
pub struct SyncRunInput {
    /// Worker pool width for document processing.
    pub max_workers: NonZeroUsize,
    /// Backpressure capacity of the synchronization queue
    /// (default `max_workers * 2`).
    pub queue_capacity: Option<NonZeroUsize>,
    /// Chunks per embedding request.
    pub embedding_batch_size: NonZeroUsize,
    /// Retry policy applied around embedding calls.
    pub retry: RetryPolicy,
}

/// One corpus document with the fresh metadata gathered while scanning.
#[derive(Debug, Clone)]
pub struct ScannedDocument {
    /// Corpus listing entry.
    pub entry: CorpusEntry,
    /// Fresh content hash; `None` when the mtime pre-filter skipped hashing.
    pub content_hash: Option<ContentHash>,
    /// Whether hashing failed because the document could not be read.
    pub read_failed: bool,
    /// Existing tracking record, if any.
    pub existing: Option<DocumentRecord>,
}

/// A document that finished the embedding stage and awaits synchronization.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    /// The planned document this came from.
    pub planned: PlannedDocument,
    /// Embedded segments, in chunk order. Empty for documents whose
    /// extracted text is empty.
    pub segments: Vec<SegmentForUpsert>,
}

/// Message consumed by the single-writer synchronization lane.
pub enum SyncMessage {
    /// Upsert segments and commit the record.
    Update(ProcessedDocument),
    /// Record a per-document processing failure.
    Failure {
        /// The planned document that failed.
        planned: PlannedDocument,
        /// The failure.
        error: ErrorEnvelope,
    },
    /// Delete a removed document's vectors and record.
    Removal(RemovedDocument),
}

/// Mutable counters collected by the synchronization lane.
#[derive(Debug, Default)]
pub struct SyncStats {
    /// Committed New documents.
    pub added: usize,
    /// Committed Modified documents.
    pub modified: usize,
    /// Committed removals.
    pub removed: usize,
    /// Documents that ended the run failed (including commit failures).
    pub failed: usize,
    /// Segments embedded and committed.
    pub embedded_segments: u64,
    /// Error that forced an early abort, if any.
    pub abort_error: Option<ErrorEnvelope>,
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or_default()
}
