//! In-memory vector store.
//!
//! Backs tests and local smoke runs. Mutations share the idempotency
//! contract of the real store: upserts overwrite, deletes of absent keys are
//! no-ops.

use corpus_sync_ports::{
    BoxFuture, SegmentForUpsert, SegmentKey, SegmentMetadata, VectorStorePort,
    VectorStoreProviderInfo,
};
use corpus_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// One stored segment.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSegment {
    /// Dense embedding vector.
    pub vector: Arc<[f32]>,
    /// Chunk text payload.
    pub content: Box<str>,
    /// Segment metadata.
    pub metadata: SegmentMetadata,
}

/// In-memory vector store adapter.
#[derive(Clone)]
pub struct MemoryVectorStore {
    provider: VectorStoreProviderInfo,
    segments: Arc<Mutex<BTreeMap<SegmentKey, StoredSegment>>>,
}

impl MemoryVectorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: VectorStoreProviderInfo {
                id: "memory".into(),
                name: "In-memory vector store".into(),
            },
            segments: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Snapshot of all stored keys, in order.
    pub fn keys(&self) -> Result<Vec<SegmentKey>> {
        let segments = self.lock()?;
        Ok(segments.keys().cloned().collect())
    }

    /// Fetch one stored segment.
    pub fn get(&self, key: &SegmentKey) -> Result<Option<StoredSegment>> {
        let segments = self.lock()?;
        Ok(segments.get(key).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<SegmentKey, StoredSegment>>> {
        self.segments.lock().map_err(|_| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "memory vector store lock poisoned",
                ErrorClass::NonRetriable,
            )
        })
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStorePort for MemoryVectorStore {
    fn provider(&self) -> &VectorStoreProviderInfo {
        &self.provider
    }

    fn upsert(
        &self,
        ctx: &RequestContext,
        segments: Vec<SegmentForUpsert>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("memory_store.upsert")?;
            let mut stored = self.lock()?;
            for segment in segments {
                stored.insert(
                    segment.key,
                    StoredSegment {
                        vector: segment.vector,
                        content: segment.content,
                        metadata: segment.metadata,
                    },
                );
            }
            Ok(())
        })
    }

    fn delete(&self, ctx: &RequestContext, keys: Vec<SegmentKey>) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("memory_store.delete")?;
            let mut stored = self.lock()?;
            for key in keys {
                stored.remove(&key);
            }
            Ok(())
        })
    }

    fn count(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("memory_store.count")?;
            let stored = self.lock()?;
            Ok(stored.len() as u64)
        })
    }
}
