//! Operator management surface over the tracking store.
//!
//! Everything here is driven by the same stores the sync run uses; none of
//! it requires a full run. The run lock is not taken: reads are safe
//! concurrently, and the two mutating operations (reprocess, clear) only
//! touch the tracking store, which serializes writers itself.

use corpus_sync_domain::{
    DocumentKey, DocumentRecord, DocumentStatus, RemovedDocument, TrackingCounts,
};
use corpus_sync_ports::{CorpusPort, TrackingStorePort, VectorStorePort};
use corpus_sync_shared::{RequestContext, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Dependencies for the management surface.
#[derive(Clone)]
pub struct ManageDeps {
    /// Tracking store.
    pub tracking: Arc<dyn TrackingStorePort>,
    /// Vector store.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Corpus source (used by orphan cleanup).
    pub corpus: Arc<dyn CorpusPort>,
}

/// Aggregate status of the tracking store and vector store.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Tracking-store aggregates.
    pub tracking: TrackingCounts,
    /// Vector-store segment count, when the store is reachable.
    pub vector_count: Option<u64>,
}

/// Read the status surface: counts by status and source, segment totals,
/// and the vector-store count.
pub async fn read_status(ctx: &RequestContext, deps: &ManageDeps) -> Result<StatusReport> {
    let tracking = deps.tracking.counts(ctx).await?;
    let vector_count = deps.vector_store.count(ctx).await.ok();
    Ok(StatusReport {
        tracking,
        vector_count,
    })
}

/// Fetch one document's tracked state.
pub async fn check_document(
    ctx: &RequestContext,
    deps: &ManageDeps,
    key: DocumentKey,
) -> Result<Option<DocumentRecord>> {
    deps.tracking.get(ctx, key).await
}

/// Force one document back to `pending` so the next run reprocesses it.
///
/// The segment keys stay on the record so the reprocess can clean up stale
/// vectors. Returns false when the document is not tracked.
pub async fn reprocess_document(
    ctx: &RequestContext,
    deps: &ManageDeps,
    key: DocumentKey,
) -> Result<bool> {
    let Some(mut record) = deps.tracking.get(ctx, key).await? else {
        return Ok(false);
    };
    record.status = DocumentStatus::Pending;
    deps.tracking.upsert(ctx, record).await?;
    Ok(true)
}

/// Clear all tracking state, forcing full reprocessing on the next run.
///
/// Vectors are left in place; the next run re-upserts under the same
/// deterministic keys, so the store converges without a wipe.
pub async fn clear_tracking(ctx: &RequestContext, deps: &ManageDeps) -> Result<()> {
    deps.tracking.clear(ctx).await
}

/// Outcome of an orphan cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
    /// Orphaned records removed.
    pub removed_records: usize,
    /// Vector segments deleted alongside them.
    pub removed_segments: usize,
}

/// Delete tracking entries (and their vectors) whose corpus document is
/// gone, without running a full sync.
pub async fn cleanup_orphans(ctx: &RequestContext, deps: &ManageDeps) -> Result<CleanupOutcome> {
    let entries = deps.corpus.list(ctx).await?;
    let present: BTreeSet<DocumentKey> = entries
        .into_iter()
        .map(|entry| DocumentKey::new(entry.source_tag, entry.path))
        .collect();

    let mut outcome = CleanupOutcome::default();
    for record in deps.tracking.list(ctx, None).await? {
        ctx.ensure_not_cancelled("manage.cleanup")?;
        let key = record.key();
        if present.contains(&key) {
            continue;
        }

        let removed = RemovedDocument {
            source_tag: record.source_tag,
            path: record.path,
            segment_keys: record.segment_keys,
        };
        outcome.removed_segments += removed.segment_keys.len();
        if !removed.segment_keys.is_empty() {
            deps.vector_store
                .delete(ctx, removed.segment_keys)
                .await?;
        }
        deps.tracking.remove(ctx, key).await?;
        outcome.removed_records += 1;
    }

    Ok(outcome)
}
