//! Inline test doubles shared by the sync_run unit tests.

use super::types::SyncRunDeps;
use corpus_sync_adapters::{extract_document, CharacterSplitter, HashedEmbedding, MemoryVectorStore};
use corpus_sync_domain::{DocumentKey, DocumentPath, DocumentRecord, SourceTag, TrackingCounts};
use corpus_sync_ports::{
    BoxFuture, CorpusEntry, CorpusPort, DocumentText, EmbedBatchRequest, EmbeddingPort,
    EmbeddingProviderInfo, EmbeddingVector, RunLockGuard, RunLockPort, TrackingStorePort,
};
use corpus_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Corpus double with in-memory documents; `None` content reads fail.
#[derive(Clone)]
pub struct StaticCorpus {
    tag: SourceTag,
    documents: Arc<Mutex<BTreeMap<DocumentPath, (Option<String>, u64)>>>,
}

impl StaticCorpus {
    pub fn new(tag: SourceTag) -> Self {
        Self {
            tag,
            documents: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn add_document(&self, path: &str, content: &str, modified_at_ms: u64) {
        let path = DocumentPath::parse(path).expect("path");
        self.lock()
            .insert(path, (Some(content.to_owned()), modified_at_ms));
    }

    pub fn add_unreadable(&self, path: &str, modified_at_ms: u64) {
        let path = DocumentPath::parse(path).expect("path");
        self.lock().insert(path, (None, modified_at_ms));
    }

    pub fn remove_document(&self, path: &str) {
        let path = DocumentPath::parse(path).expect("path");
        self.lock().remove(&path);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DocumentPath, (Option<String>, u64)>> {
        self.documents.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl CorpusPort for StaticCorpus {
    fn list(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CorpusEntry>>> {
        let entries: Vec<CorpusEntry> = self
            .lock()
            .iter()
            .map(|(path, (content, modified_at_ms))| CorpusEntry {
                source_tag: self.tag.clone(),
                path: path.clone(),
                modified_at_ms: *modified_at_ms,
                size_bytes: content.as_ref().map_or(0, String::len) as u64,
            })
            .collect();
        Box::pin(async move { Ok(entries) })
    }

    fn read_bytes(
        &self,
        _ctx: &RequestContext,
        _source_tag: SourceTag,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<Vec<u8>>> {
        let content = self.lock().get(&path).cloned();
        Box::pin(async move {
            match content {
                Some((Some(content), _)) => Ok(content.into_bytes()),
                _ => Err(ErrorEnvelope::expected(
                    ErrorCode::corpus_read_failed(),
                    "unreadable test document",
                )),
            }
        })
    }

    fn read_document(
        &self,
        ctx: &RequestContext,
        source_tag: SourceTag,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<DocumentText>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let bytes = self.read_bytes(&ctx, source_tag, path).await?;
            extract_document(&bytes)
        })
    }
}

/// Embedding double that counts calls and delegates to the hashed adapter.
#[derive(Clone)]
pub struct CountingEmbedding {
    inner: HashedEmbedding,
    calls: Arc<AtomicU32>,
}

impl CountingEmbedding {
    pub fn reliable() -> Self {
        Self {
            inner: HashedEmbedding::new(8).expect("hashed embedding"),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl EmbeddingPort for CountingEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        self.inner.provider()
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.embed_batch(ctx, request)
    }
}

/// Embedding double that fails a configurable number of leading calls, or
/// fails permanently for specific texts.
#[derive(Clone)]
pub struct FlakyEmbedding {
    inner: HashedEmbedding,
    calls: Arc<AtomicU32>,
    transient_failures: u32,
    permanent: bool,
    poisoned_needle: Option<Box<str>>,
}

impl FlakyEmbedding {
    pub fn rate_limited_times(transient_failures: u32) -> Self {
        Self {
            inner: HashedEmbedding::new(8).expect("hashed embedding"),
            calls: Arc::new(AtomicU32::new(0)),
            transient_failures,
            permanent: false,
            poisoned_needle: None,
        }
    }

    pub fn always_permanent() -> Self {
        Self {
            inner: HashedEmbedding::new(8).expect("hashed embedding"),
            calls: Arc::new(AtomicU32::new(0)),
            transient_failures: 0,
            permanent: true,
            poisoned_needle: None,
        }
    }

    /// Fail permanently whenever a batch contains `needle`.
    pub fn poisoned_by(needle: &str) -> Self {
        Self {
            inner: HashedEmbedding::new(8).expect("hashed embedding"),
            calls: Arc::new(AtomicU32::new(0)),
            transient_failures: 0,
            permanent: false,
            poisoned_needle: Some(needle.to_owned().into_boxed_str()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl EmbeddingPort for FlakyEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        self.inner.provider()
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if self.permanent {
            return Box::pin(async move {
                Err(ErrorEnvelope::expected(
                    ErrorCode::provider_quota_exhausted(),
                    "permanent test failure",
                ))
            });
        }
        if let Some(needle) = self.poisoned_needle.as_ref() {
            let poisoned = request
                .texts
                .iter()
                .any(|text| text.contains(needle.as_ref()));
            if poisoned {
                return Box::pin(async move {
                    Err(ErrorEnvelope::expected(
                        ErrorCode::provider_quota_exhausted(),
                        "poisoned test input",
                    ))
                });
            }
        }
        if call < self.transient_failures {
            return Box::pin(async move {
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::provider_rate_limited(),
                    "rate limited",
                    ErrorClass::Retriable,
                ))
            });
        }
        self.inner.embed_batch(ctx, request)
    }
}

/// In-memory tracking store double.
#[derive(Clone, Default)]
pub struct MemoryTrackingStore {
    records: Arc<Mutex<BTreeMap<DocumentKey, DocumentRecord>>>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DocumentKey, DocumentRecord>> {
        self.records.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl TrackingStorePort for MemoryTrackingStore {
    fn get(
        &self,
        _ctx: &RequestContext,
        key: DocumentKey,
    ) -> BoxFuture<'_, Result<Option<DocumentRecord>>> {
        let record = self.lock().get(&key).cloned();
        Box::pin(async move { Ok(record) })
    }

    fn upsert(&self, _ctx: &RequestContext, record: DocumentRecord) -> BoxFuture<'_, Result<()>> {
        self.lock().insert(record.key(), record);
        Box::pin(async move { Ok(()) })
    }

    fn remove(&self, _ctx: &RequestContext, key: DocumentKey) -> BoxFuture<'_, Result<()>> {
        self.lock().remove(&key);
        Box::pin(async move { Ok(()) })
    }

    fn list(
        &self,
        _ctx: &RequestContext,
        source_tag: Option<SourceTag>,
    ) -> BoxFuture<'_, Result<Vec<DocumentRecord>>> {
        let records: Vec<DocumentRecord> = self
            .lock()
            .values()
            .filter(|record| {
                source_tag
                    .as_ref()
                    .is_none_or(|tag| &record.source_tag == tag)
            })
            .cloned()
            .collect();
        Box::pin(async move { Ok(records) })
    }

    fn counts(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<TrackingCounts>> {
        let mut counts = TrackingCounts::default();
        for record in self.lock().values() {
            counts.total += 1;
            *counts.by_status.entry(record.status).or_insert(0) += 1;
            *counts
                .by_source
                .entry(record.source_tag.clone())
                .or_insert(0) += 1;
            counts.total_segments += record.segment_keys.len() as u64;
            if let Some(processed_at) = record.last_processed_at_ms {
                if processed_at > counts.last_processed_at_ms.unwrap_or(0) {
                    counts.last_processed_at_ms = Some(processed_at);
                }
            }
        }
        Box::pin(async move { Ok(counts) })
    }

    fn clear(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        self.lock().clear();
        Box::pin(async move { Ok(()) })
    }
}

/// Run lock double that always grants the lock.
pub struct NoopRunLock;

struct NoopGuard;

impl RunLockGuard for NoopGuard {}

impl RunLockPort for NoopRunLock {
    fn acquire(&self) -> Result<Box<dyn RunLockGuard>> {
        Ok(Box::new(NoopGuard))
    }
}

/// Deps over a static corpus with reliable local embedding.
pub fn deps_with(corpus: StaticCorpus) -> SyncRunDeps {
    deps_with_embedding(corpus, CountingEmbedding::reliable())
}

/// Deps over a static corpus with the given embedding adapter.
pub fn deps_with_embedding<E>(corpus: StaticCorpus, embedding: E) -> SyncRunDeps
where
    E: EmbeddingPort + 'static,
{
    SyncRunDeps {
        corpus: Arc::new(corpus),
        tracking: Arc::new(MemoryTrackingStore::new()),
        vector_store: Arc::new(MemoryVectorStore::new()),
        embedding: Arc::new(embedding),
        splitter: Arc::new(CharacterSplitter::new(200, 20).expect("splitter")),
        run_lock: Arc::new(NoopRunLock),
        logger: None,
    }
}

/// Deps over an empty corpus with the given vector store.
pub fn deps_with_store(store: MemoryVectorStore) -> SyncRunDeps {
    let tag = SourceTag::parse("vosdroits").expect("tag");
    SyncRunDeps {
        corpus: Arc::new(StaticCorpus::new(tag)),
        tracking: Arc::new(MemoryTrackingStore::new()),
        vector_store: Arc::new(store),
        embedding: Arc::new(CountingEmbedding::reliable()),
        splitter: Arc::new(CharacterSplitter::new(200, 20).expect("splitter")),
        run_lock: Arc::new(NoopRunLock),
        logger: None,
    }
}

/// Smallest sane input for unit tests.
pub fn test_input() -> super::SyncRunInput {
    super::SyncRunInput {
        max_workers: NonZeroUsize::new(2).expect("workers"),
        queue_capacity: None,
        embedding_batch_size: NonZeroUsize::new(4).expect("batch"),
        retry: corpus_sync_shared::RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ratio_pct: 0,
        },
    }
}
