//! Vector store boundary contract.

use crate::BoxFuture;
use corpus_sync_domain::{DocumentPath, SegmentKey, SourceTag};
use corpus_sync_shared::{RequestContext, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorStoreProviderInfo {
    /// Stable provider identifier (e.g. `chroma`).
    pub id: Box<str>,
    /// Human-readable provider name.
    pub name: Box<str>,
}

/// Metadata stored alongside each segment vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMetadata {
    /// Data source the segment's document belongs to.
    pub source_tag: SourceTag,
    /// Relative path of the segment's document.
    pub path: DocumentPath,
    /// Zero-based chunk index within the document.
    pub chunk_index: u32,
    /// Total chunks the document produced.
    pub total_chunks: u32,
    /// Document-level attributes extracted from the source (Dublin Core
    /// fields, dump attributes like `spUrl`).
    pub attributes: BTreeMap<Box<str>, Value>,
}

/// One segment to upsert: key, vector, text, and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentForUpsert {
    /// Deterministic segment key; upserting the same key overwrites.
    pub key: SegmentKey,
    /// Dense embedding vector.
    pub vector: Arc<[f32]>,
    /// Chunk text payload.
    pub content: Box<str>,
    /// Segment metadata.
    pub metadata: SegmentMetadata,
}

/// Boundary contract for vector storage.
///
/// Both mutations are idempotent: upserting an existing key overwrites it and
/// deleting an absent key is a no-op. Similarity search is served elsewhere
/// and is not part of this contract.
pub trait VectorStorePort: Send + Sync {
    /// Provider info for this implementation.
    fn provider(&self) -> &VectorStoreProviderInfo;

    /// Upsert a batch of segments.
    fn upsert(
        &self,
        ctx: &RequestContext,
        segments: Vec<SegmentForUpsert>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete segments by key.
    fn delete(&self, ctx: &RequestContext, keys: Vec<SegmentKey>) -> BoxFuture<'_, Result<()>>;

    /// Total number of stored segments.
    fn count(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u64>>;
}
