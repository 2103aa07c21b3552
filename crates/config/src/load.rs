//! Configuration loading from disk.

use crate::schema::SyncConfig;
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result};
use std::path::Path;

/// Load and validate a configuration file.
///
/// The format follows the file extension: `.json` parses as JSON, everything
/// else as TOML.
pub fn load_config(path: &Path) -> Result<SyncConfig> {
    let raw = std::fs::read_to_string(path).map_err(|error| {
        ErrorEnvelope::from(error).with_metadata("path", path.to_string_lossy().to_string())
    })?;

    let config = parse_config(&raw, is_json(path))?;
    config.validate()?;
    Ok(config)
}

/// Parse a configuration payload without touching the filesystem.
pub fn parse_config(raw: &str, json: bool) -> Result<SyncConfig> {
    if json {
        serde_json::from_str(raw).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("failed to parse JSON config: {error}"),
            )
        })
    } else {
        toml::from_str(raw).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("failed to parse TOML config: {error}"),
            )
        })
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
}
