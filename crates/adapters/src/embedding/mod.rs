//! Embedding adapters and provider selection.

mod hashed;
#[cfg(feature = "mistral")]
mod mistral;

pub use hashed::HashedEmbedding;
#[cfg(feature = "mistral")]
pub use mistral::{MistralEmbedding, MistralEmbeddingConfig};

use corpus_sync_config::{EmbeddingConfig, EmbeddingProviderKind};
use corpus_sync_ports::EmbeddingPort;
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result};
use std::sync::Arc;

/// Build the configured embedding adapter.
pub fn build_embedding(
    config: &EmbeddingConfig,
    api_key: Option<Box<str>>,
) -> Result<Arc<dyn EmbeddingPort>> {
    match config.provider {
        EmbeddingProviderKind::Hashed => {
            let dimension = config.dimension.ok_or_else(|| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "the hashed provider requires an explicit dimension",
                )
            })?;
            Ok(Arc::new(HashedEmbedding::new(dimension)?))
        },
        #[cfg(feature = "mistral")]
        EmbeddingProviderKind::Mistral => {
            let api_key = api_key.ok_or_else(|| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "embedding API key is not set",
                )
            })?;
            let adapter = MistralEmbedding::new(&MistralEmbeddingConfig {
                api_key,
                model: config.model.clone().into_boxed_str(),
                base_url: config
                    .base_url
                    .clone()
                    .map(String::into_boxed_str),
                timeout_ms: config.timeout_ms,
            })?;
            Ok(Arc::new(adapter))
        },
        #[cfg(not(feature = "mistral"))]
        EmbeddingProviderKind::Mistral => Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "the mistral provider is not compiled in",
        )),
    }
}
