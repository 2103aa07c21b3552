//! Tracking store boundary contract.

use crate::BoxFuture;
use corpus_sync_domain::{DocumentKey, DocumentRecord, SourceTag, TrackingCounts};
use corpus_sync_shared::{RequestContext, Result};

/// Boundary contract for the durable per-document tracking table.
///
/// The tracking store is the source of truth for "already indexed". It is
/// keyed by `(source_tag, path)`, survives process restarts, and is never
/// rebuilt from the vector store. Unreachable-backend failures must come back
/// with [`corpus_sync_shared::ErrorCode::store_unavailable`] so the
/// orchestrator can abort the run early instead of failing every document.
pub trait TrackingStorePort: Send + Sync {
    /// Fetch one record by identity.
    fn get(
        &self,
        ctx: &RequestContext,
        key: DocumentKey,
    ) -> BoxFuture<'_, Result<Option<DocumentRecord>>>;

    /// Insert or replace a record.
    fn upsert(&self, ctx: &RequestContext, record: DocumentRecord) -> BoxFuture<'_, Result<()>>;

    /// Delete a record. Deleting an absent record is a no-op.
    fn remove(&self, ctx: &RequestContext, key: DocumentKey) -> BoxFuture<'_, Result<()>>;

    /// List records, optionally filtered by source tag, ordered by
    /// `(source_tag, path)`.
    fn list(
        &self,
        ctx: &RequestContext,
        source_tag: Option<SourceTag>,
    ) -> BoxFuture<'_, Result<Vec<DocumentRecord>>>;

    /// Aggregate counts for the status surface.
    fn counts(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<TrackingCounts>>;

    /// Delete every record (forces full reprocessing on the next run).
    fn clear(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;
}
