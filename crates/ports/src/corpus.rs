//! Corpus source boundary contract.

use crate::BoxFuture;
use corpus_sync_domain::{DocumentPath, SourceTag};
use corpus_sync_shared::{RequestContext, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// One enumerable document in the corpus, with cheap filesystem metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    /// Data source the document belongs to.
    pub source_tag: SourceTag,
    /// Relative path within the source root.
    pub path: DocumentPath,
    /// Modification time of the underlying file (ms since epoch).
    pub modified_at_ms: u64,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Extracted text payload of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentText {
    /// Flattened text content; may be empty for metadata-only documents.
    pub text: Box<str>,
    /// Document-level attributes captured during extraction.
    pub attributes: BTreeMap<Box<str>, Value>,
}

/// Boundary contract over however raw dumps are made available on disk.
///
/// Download and extraction of the dumps themselves happen upstream; this port
/// only enumerates and reads what is already there. Unreadable documents
/// surface with [`corpus_sync_shared::ErrorCode::corpus_read_failed`] and are
/// treated as permanent per-document failures.
pub trait CorpusPort: Send + Sync {
    /// Enumerate all documents across configured sources.
    ///
    /// The listing is a single snapshot; the engine assumes the corpus does
    /// not mutate underneath a running sync.
    fn list(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CorpusEntry>>>;

    /// Read a document's raw bytes (for content hashing).
    fn read_bytes(
        &self,
        ctx: &RequestContext,
        source_tag: SourceTag,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<Vec<u8>>>;

    /// Read and extract a document's text payload.
    fn read_document(
        &self,
        ctx: &RequestContext,
        source_tag: SourceTag,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<DocumentText>>;
}
