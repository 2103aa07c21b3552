//! # corpus-sync-adapters
//!
//! Adapter implementations for the corpus-sync ports: embedding providers,
//! vector stores, the SQLite tracking store, the filesystem XML corpus
//! source, the character splitter, the run lock, and the logger.

pub mod corpus;
pub mod embedding;
pub mod lock;
pub mod logger;
pub mod splitter;
pub mod tracking;
pub mod vectorstore;

pub use corpus::{extract_document, FsCorpus, FsCorpusSource};
pub use embedding::{build_embedding, HashedEmbedding};
pub use lock::FileRunLock;
pub use logger::TracingLogger;
pub use splitter::CharacterSplitter;
pub use tracking::SqliteTrackingStore;
pub use vectorstore::{build_vector_store, MemoryVectorStore};

#[cfg(feature = "mistral")]
pub use embedding::{MistralEmbedding, MistralEmbeddingConfig};
#[cfg(feature = "chroma")]
pub use vectorstore::{ChromaVectorStore, ChromaVectorStoreConfig};

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
