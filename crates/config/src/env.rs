//! Environment resolution for secrets.

use crate::schema::{EmbeddingConfig, EmbeddingProviderKind};
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result};

/// Resolve the embedding API key from the configured environment variable.
///
/// Required for remote providers; the hashed provider needs no key and
/// resolves to `None`.
pub fn resolve_api_key(config: &EmbeddingConfig) -> Result<Option<Box<str>>> {
    if config.provider == EmbeddingProviderKind::Hashed {
        return Ok(None);
    }

    match std::env::var(&config.api_key_env) {
        Ok(value) if !value.trim().is_empty() => {
            Ok(Some(value.trim().to_owned().into_boxed_str()))
        },
        _ => Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "embedding API key is not set",
        )
        .with_metadata("env", config.api_key_env.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_provider_needs_no_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Hashed,
            dimension: Some(8),
            ..EmbeddingConfig::default()
        };
        assert_eq!(resolve_api_key(&config).ok(), Some(None));
    }

    #[test]
    fn missing_key_is_reported_with_env_name() {
        let config = EmbeddingConfig {
            api_key_env: "CORPUS_SYNC_TEST_KEY_THAT_DOES_NOT_EXIST".to_owned(),
            ..EmbeddingConfig::default()
        };
        let error = match resolve_api_key(&config) {
            Err(error) => error,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(
            error.metadata.get("env").map(String::as_str),
            Some("CORPUS_SYNC_TEST_KEY_THAT_DOES_NOT_EXIST")
        );
    }
}
