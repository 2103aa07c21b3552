//! # corpus-sync-config
//!
//! Configuration schema, loading, and validation for the corpus-sync
//! workspace. Parsing is deterministic: unknown fields are rejected, bounds
//! are enforced manually, and every violation names the offending field.

pub mod env;
pub mod load;
pub mod schema;

pub use env::resolve_api_key;
pub use load::{load_config, parse_config};
pub use schema::{
    ChunkingConfig, ConcurrencyConfig, EmbeddingConfig, EmbeddingProviderKind, RetryConfig,
    SourceConfig, SyncConfig, TrackingConfig, VectorStoreConfig, VectorStoreProviderKind,
    CURRENT_CONFIG_VERSION,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
