//! Vector synchronization: the single writer to both stores.
//!
//! Ordering per document is strict: vector upsert, then stale-key deletion,
//! then the tracking commit. A crash between any two steps leaves the
//! tracking store pointing at the previous correct state, so the worst case
//! is redundant reprocessing on the next run, never a record referencing
//! vectors that do not exist.

use super::types::{now_epoch_ms, ProcessedDocument, SyncRunDeps};
use corpus_sync_domain::{DocumentKey, DocumentRecord, RemovedDocument, SegmentKey};
use corpus_sync_ports::{LoggerPort, SegmentForUpsert, TrackingStorePort, VectorStorePort};
use corpus_sync_shared::{ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeSet;

/// Upsert a processed document's segments, delete its stale segments, and
/// commit the updated record.
pub async fn apply_update(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    processed: ProcessedDocument,
) -> Result<usize> {
    let ProcessedDocument { planned, segments } = processed;
    let segment_count = segments.len();

    let fresh_keys: Vec<SegmentKey> = segments
        .iter()
        .map(|segment| segment.key.clone())
        .collect();

    upsert_segments(ctx, deps, segments).await?;

    // Only after the upsert confirms success: drop keys from the previous
    // processing that this pass no longer produced (chunk-count shrinkage).
    let fresh_set: BTreeSet<&SegmentKey> = fresh_keys.iter().collect();
    let stale: Vec<SegmentKey> = planned
        .previous_segment_keys
        .iter()
        .filter(|key| !fresh_set.contains(key))
        .cloned()
        .collect();
    if !stale.is_empty() {
        deps.vector_store.delete(ctx, stale).await?;
    }

    let mut record = DocumentRecord::new_pending(
        planned.source_tag,
        planned.path,
        planned.modified_at_ms,
        planned.content_hash,
    );
    record.mark_processed(fresh_keys, now_epoch_ms());
    deps.tracking.upsert(ctx, record).await?;

    Ok(segment_count)
}

/// Record a per-document processing failure.
///
/// The previous segment keys are preserved so a later removal can still
/// clean up the vectors from the last successful run.
pub async fn apply_failure(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    planned: corpus_sync_domain::PlannedDocument,
    error: &ErrorEnvelope,
) -> Result<()> {
    if let Some(logger) = deps.logger.as_ref() {
        logger.warn(
            "sync.document.failed",
            "document processing failed",
            Some(failure_fields(&planned, error)),
        );
    }

    let mut record = DocumentRecord::new_pending(
        planned.source_tag,
        planned.path,
        planned.modified_at_ms,
        planned.content_hash,
    );
    record.segment_keys = planned.previous_segment_keys;
    record.failure_count = planned.failure_count;
    record.mark_failed();
    deps.tracking.upsert(ctx, record).await
}

/// Delete a removed document's vectors, then its record.
pub async fn apply_removal(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    removed: RemovedDocument,
) -> Result<()> {
    if !removed.segment_keys.is_empty() {
        deps.vector_store
            .delete(ctx, removed.segment_keys.clone())
            .await?;
    }
    deps.tracking
        .remove(
            ctx,
            DocumentKey::new(removed.source_tag, removed.path),
        )
        .await
}

async fn upsert_segments(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    segments: Vec<SegmentForUpsert>,
) -> Result<()> {
    if segments.is_empty() {
        return Ok(());
    }
    deps.vector_store.upsert(ctx, segments).await
}

fn failure_fields(
    planned: &corpus_sync_domain::PlannedDocument,
    error: &ErrorEnvelope,
) -> corpus_sync_ports::LogFields {
    let mut fields = corpus_sync_ports::LogFields::new();
    fields.insert(
        "sourceTag".into(),
        serde_json::Value::String(planned.source_tag.as_str().to_owned()),
    );
    fields.insert(
        "path".into(),
        serde_json::Value::String(planned.path.as_str().to_owned()),
    );
    fields.insert(
        "error".into(),
        serde_json::Value::String(error.to_string()),
    );
    fields
}
