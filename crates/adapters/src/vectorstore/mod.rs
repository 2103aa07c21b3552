//! Vector store adapters and provider selection.

#[cfg(feature = "chroma")]
mod chroma;
mod memory;

#[cfg(feature = "chroma")]
pub use chroma::{ChromaVectorStore, ChromaVectorStoreConfig};
pub use memory::MemoryVectorStore;

use corpus_sync_config::{VectorStoreConfig, VectorStoreProviderKind};
use corpus_sync_ports::VectorStorePort;
use corpus_sync_shared::Result;
use std::sync::Arc;

/// Build the configured vector store adapter.
pub fn build_vector_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStorePort>> {
    match config.provider {
        VectorStoreProviderKind::Memory => Ok(Arc::new(MemoryVectorStore::new())),
        #[cfg(feature = "chroma")]
        VectorStoreProviderKind::Chroma => {
            let adapter = ChromaVectorStore::new(ChromaVectorStoreConfig {
                address: config.address.clone().into_boxed_str(),
                collection: config.collection.clone().into_boxed_str(),
                timeout_ms: config.timeout_ms,
            })?;
            Ok(Arc::new(adapter))
        },
        #[cfg(not(feature = "chroma"))]
        VectorStoreProviderKind::Chroma => Err(corpus_sync_shared::ErrorEnvelope::expected(
            corpus_sync_shared::ErrorCode::invalid_input(),
            "the chroma provider is not compiled in",
        )),
    }
}
