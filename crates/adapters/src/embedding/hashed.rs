//! Deterministic local embedding adapter.
//!
//! Derives a unit-normalized vector from the SHA-256 digest of the input
//! text. Not a semantic embedding: identical texts map to identical vectors
//! and different texts almost surely differ, which is exactly what the sync
//! engine's change-detection and cleanup paths need in tests and air-gapped
//! runs.

use corpus_sync_ports::{
    BoxFuture, EmbedBatchRequest, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector,
};
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use sha2::{Digest, Sha256};

/// Hash-derived embedding adapter.
#[derive(Debug, Clone)]
pub struct HashedEmbedding {
    provider: EmbeddingProviderInfo,
    dimension: u32,
}

impl HashedEmbedding {
    /// Create an adapter producing vectors of the given dimension.
    pub fn new(dimension: u32) -> Result<Self> {
        if dimension == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding dimension must be greater than zero",
            ));
        }
        Ok(Self {
            provider: EmbeddingProviderInfo {
                id: "hashed".into(),
                name: "Deterministic hash embedding".into(),
            },
            dimension,
        })
    }

    fn embed_text(&self, text: &str) -> EmbeddingVector {
        let mut values = Vec::with_capacity(self.dimension as usize);
        let mut counter = 0u32;
        while values.len() < self.dimension as usize {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            let digest = hasher.finalize();
            for pair in digest.chunks_exact(2) {
                if values.len() == self.dimension as usize {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]);
                values.push(f32::from(raw) / f32::from(u16::MAX) - 0.5);
            }
            counter = counter.wrapping_add(1);
        }

        let norm = values.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in &mut values {
                *value /= norm;
            }
        }
        EmbeddingVector::from_vec(values)
    }
}

impl EmbeddingPort for HashedEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let ctx = ctx.clone();
        let texts = request.texts;
        Box::pin(async move {
            ctx.ensure_not_cancelled("hashed_embedding.embed_batch")?;
            Ok(texts
                .iter()
                .map(|text| self.embed_text(text.as_ref()))
                .collect())
        })
    }
}
