//! Configuration schema, defaults, validation, and normalization.
//!
//! Deserialization uses `serde` (TOML and JSON). Validation is manual and
//! returns typed errors mapped to `ErrorEnvelope`, with every rejected field
//! named in metadata.

use corpus_sync_domain::SourceTag;
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

const CHUNK_SIZE_MIN: usize = 1;
const CHUNK_SIZE_MAX: usize = 100_000;

const EMBEDDING_TIMEOUT_MIN_MS: u64 = 1_000;
const EMBEDDING_TIMEOUT_MAX_MS: u64 = 600_000;
const EMBEDDING_BATCH_SIZE_MIN: usize = 1;
const EMBEDDING_BATCH_SIZE_MAX: usize = 2_048;

const VECTOR_STORE_TIMEOUT_MIN_MS: u64 = 1_000;
const VECTOR_STORE_TIMEOUT_MAX_MS: u64 = 600_000;

const RETRY_MAX_ATTEMPTS_MIN: u32 = 1;
const RETRY_MAX_ATTEMPTS_MAX: u32 = 10;
const RETRY_BASE_DELAY_MIN_MS: u64 = 1;
const RETRY_BASE_DELAY_MAX_MS: u64 = 60_000;
const RETRY_MAX_DELAY_MIN_MS: u64 = 1;
const RETRY_MAX_DELAY_MAX_MS: u64 = 600_000;
const RETRY_JITTER_RATIO_PCT_MAX: u32 = 100;

const MAX_WORKERS_MIN: usize = 1;
const MAX_WORKERS_MAX: usize = 256;

/// Top-level configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Configuration schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Data sources to ingest.
    pub sources: Vec<SourceConfig>,
    /// Chunking parameters.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Vector store settings.
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    /// Tracking store settings.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Retry policy for embedding calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Concurrency limits.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Path of the exclusive run lock file.
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
}

/// One configured data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Source tag (e.g. `vosdroits`).
    pub tag: String,
    /// Directory containing the extracted dump for this source.
    pub root_dir: PathBuf,
}

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Embedding provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Remote Mistral embeddings API.
    Mistral,
    /// Deterministic local embedding (tests and air-gapped runs).
    Hashed,
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    /// Model name sent to the provider.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
    /// Chunks per embedding request.
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    /// Expected vector dimension (required by the hashed provider).
    #[serde(default)]
    pub dimension: Option<u32>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_ms: default_embedding_timeout_ms(),
            batch_size: default_embedding_batch_size(),
            dimension: None,
        }
    }
}

/// Vector store provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreProviderKind {
    /// Chroma over its REST API.
    Chroma,
    /// In-memory store (tests and smoke runs).
    Memory,
}

/// Vector store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorStoreConfig {
    /// Which store to use.
    #[serde(default = "default_vector_store_provider")]
    pub provider: VectorStoreProviderKind,
    /// Base URL of the store's REST service.
    #[serde(default = "default_vector_store_address")]
    pub address: String,
    /// Collection name.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_vector_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_store_provider(),
            address: default_vector_store_address(),
            collection: default_collection(),
            timeout_ms: default_vector_store_timeout_ms(),
        }
    }
}

/// Tracking store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfig {
    /// Path of the SQLite tracking database.
    #[serde(default = "default_tracking_db_path")]
    pub db_path: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            db_path: default_tracking_db_path(),
        }
    }
}

/// Retry policy for embedding calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum attempts (including the first try).
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter ratio as percentage.
    #[serde(default = "default_retry_jitter_ratio_pct")]
    pub jitter_ratio_pct: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            jitter_ratio_pct: default_retry_jitter_ratio_pct(),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter_ratio_pct: config.jitter_ratio_pct,
        }
    }
}

/// Concurrency limits for the processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyConfig {
    /// Worker pool width for document processing.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Backpressure capacity of the synchronization queue.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            queue_capacity: None,
        }
    }
}

impl SyncConfig {
    /// Validate the configuration, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(invalid("version", "unsupported configuration version")
                .with_metadata("found", self.version.to_string())
                .with_metadata("expected", CURRENT_CONFIG_VERSION.to_string()));
        }

        if self.sources.is_empty() {
            return Err(invalid("sources", "at least one source must be configured"));
        }
        let mut seen_tags = BTreeSet::new();
        for source in &self.sources {
            let tag = SourceTag::parse(&source.tag).map_err(ErrorEnvelope::from)?;
            if !seen_tags.insert(tag) {
                return Err(invalid("sources", "source tags must be unique")
                    .with_metadata("tag", source.tag.clone()));
            }
        }

        check_range(
            "chunking.chunk_size",
            self.chunking.chunk_size,
            CHUNK_SIZE_MIN,
            CHUNK_SIZE_MAX,
        )?;
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(invalid(
                "chunking.chunk_overlap",
                "chunk overlap must be smaller than chunk size",
            ));
        }

        check_range(
            "embedding.timeout_ms",
            self.embedding.timeout_ms,
            EMBEDDING_TIMEOUT_MIN_MS,
            EMBEDDING_TIMEOUT_MAX_MS,
        )?;
        check_range(
            "embedding.batch_size",
            self.embedding.batch_size,
            EMBEDDING_BATCH_SIZE_MIN,
            EMBEDDING_BATCH_SIZE_MAX,
        )?;
        if self.embedding.model.trim().is_empty() {
            return Err(invalid("embedding.model", "model must be non-empty"));
        }
        if self.embedding.provider == EmbeddingProviderKind::Hashed
            && self.embedding.dimension.is_none()
        {
            return Err(invalid(
                "embedding.dimension",
                "the hashed provider requires an explicit dimension",
            ));
        }

        check_range(
            "vector_store.timeout_ms",
            self.vector_store.timeout_ms,
            VECTOR_STORE_TIMEOUT_MIN_MS,
            VECTOR_STORE_TIMEOUT_MAX_MS,
        )?;
        if self.vector_store.collection.trim().is_empty() {
            return Err(invalid(
                "vector_store.collection",
                "collection must be non-empty",
            ));
        }
        if self.vector_store.provider == VectorStoreProviderKind::Chroma
            && self.vector_store.address.trim().is_empty()
        {
            return Err(invalid("vector_store.address", "address must be non-empty"));
        }

        check_range(
            "retry.max_attempts",
            self.retry.max_attempts,
            RETRY_MAX_ATTEMPTS_MIN,
            RETRY_MAX_ATTEMPTS_MAX,
        )?;
        check_range(
            "retry.base_delay_ms",
            self.retry.base_delay_ms,
            RETRY_BASE_DELAY_MIN_MS,
            RETRY_BASE_DELAY_MAX_MS,
        )?;
        check_range(
            "retry.max_delay_ms",
            self.retry.max_delay_ms,
            RETRY_MAX_DELAY_MIN_MS,
            RETRY_MAX_DELAY_MAX_MS,
        )?;
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "max delay must not be smaller than the base delay",
            ));
        }
        check_range(
            "retry.jitter_ratio_pct",
            self.retry.jitter_ratio_pct,
            0,
            RETRY_JITTER_RATIO_PCT_MAX,
        )?;

        check_range(
            "concurrency.max_workers",
            self.concurrency.max_workers,
            MAX_WORKERS_MIN,
            MAX_WORKERS_MAX,
        )?;
        if self.concurrency.queue_capacity == Some(0) {
            return Err(invalid(
                "concurrency.queue_capacity",
                "queue capacity must be a positive number",
            ));
        }

        Ok(())
    }

    /// Parsed source tags, in configuration order.
    pub fn source_tags(&self) -> Result<Vec<SourceTag>> {
        self.sources
            .iter()
            .map(|source| SourceTag::parse(&source.tag).map_err(ErrorEnvelope::from))
            .collect()
    }
}

fn invalid(field: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::invalid_input(), message)
        .with_metadata("field", field.to_owned())
}

fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(invalid(field, "value out of range")
            .with_metadata("value", value.to_string())
            .with_metadata("min", min.to_string())
            .with_metadata("max", max.to_string()));
    }
    Ok(())
}

const fn default_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

const fn default_chunk_size() -> usize {
    2_000
}

const fn default_chunk_overlap() -> usize {
    100
}

const fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Mistral
}

fn default_embedding_model() -> String {
    "mistral-embed".to_owned()
}

fn default_api_key_env() -> String {
    "MISTRAL_API_KEY".to_owned()
}

const fn default_embedding_timeout_ms() -> u64 {
    30_000
}

const fn default_embedding_batch_size() -> usize {
    20
}

const fn default_vector_store_provider() -> VectorStoreProviderKind {
    VectorStoreProviderKind::Chroma
}

fn default_vector_store_address() -> String {
    "http://127.0.0.1:8000".to_owned()
}

fn default_collection() -> String {
    "documents".to_owned()
}

const fn default_vector_store_timeout_ms() -> u64 {
    30_000
}

fn default_tracking_db_path() -> PathBuf {
    PathBuf::from(".corpus-sync/tracking.sqlite3")
}

const fn default_retry_max_attempts() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    500
}

const fn default_retry_max_delay_ms() -> u64 {
    30_000
}

const fn default_retry_jitter_ratio_pct() -> u32 {
    20
}

const fn default_max_workers() -> usize {
    8
}

fn default_lock_path() -> PathBuf {
    PathBuf::from(".corpus-sync/run.lock")
}
