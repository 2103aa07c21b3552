//! Adapter wiring from configuration.

use corpus_sync_adapters::{
    build_embedding, build_vector_store, CharacterSplitter, FileRunLock, FsCorpus, FsCorpusSource,
    SqliteTrackingStore, TracingLogger,
};
use corpus_sync_app::{ManageDeps, SyncRunDeps, SyncRunInput};
use corpus_sync_config::{resolve_api_key, SyncConfig};
use corpus_sync_domain::SourceTag;
use corpus_sync_ports::CorpusPort;
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result, RetryPolicy};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Build the full dependency set for a sync run.
pub fn build_run_deps(config: &SyncConfig) -> Result<SyncRunDeps> {
    let api_key = resolve_api_key(&config.embedding)?;
    Ok(SyncRunDeps {
        corpus: build_corpus(config)?,
        tracking: Arc::new(SqliteTrackingStore::new(config.tracking.db_path.clone())),
        vector_store: build_vector_store(&config.vector_store)?,
        embedding: build_embedding(&config.embedding, api_key)?,
        splitter: Arc::new(CharacterSplitter::new(
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        )?),
        run_lock: Arc::new(FileRunLock::new(config.lock_path.clone())),
        logger: Some(Arc::new(TracingLogger::new())),
    })
}

/// Build the dependency set for management commands.
///
/// No embedding provider is constructed, so status queries work without an
/// API key in the environment.
pub fn build_manage_deps(config: &SyncConfig) -> Result<ManageDeps> {
    Ok(ManageDeps {
        tracking: Arc::new(SqliteTrackingStore::new(config.tracking.db_path.clone())),
        vector_store: build_vector_store(&config.vector_store)?,
        corpus: build_corpus(config)?,
    })
}

/// Translate configured limits into run input.
pub fn build_run_input(config: &SyncConfig) -> Result<SyncRunInput> {
    Ok(SyncRunInput {
        max_workers: positive(config.concurrency.max_workers, "concurrency.max_workers")?,
        queue_capacity: config
            .concurrency
            .queue_capacity
            .map(|capacity| positive(capacity, "concurrency.queue_capacity"))
            .transpose()?,
        embedding_batch_size: positive(config.embedding.batch_size, "embedding.batch_size")?,
        retry: RetryPolicy::from(config.retry),
    })
}

fn build_corpus(config: &SyncConfig) -> Result<Arc<dyn CorpusPort>> {
    let mut sources = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        sources.push(FsCorpusSource {
            tag: SourceTag::parse(&source.tag).map_err(ErrorEnvelope::from)?,
            root_dir: source.root_dir.clone(),
        });
    }
    Ok(Arc::new(FsCorpus::new(sources)?))
}

fn positive(value: usize, field: &str) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value).ok_or_else(|| {
        ErrorEnvelope::expected(ErrorCode::invalid_input(), "value must be positive")
            .with_metadata("field", field.to_owned())
    })
}
