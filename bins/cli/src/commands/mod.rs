//! Command handlers.

mod manage;
mod run;
mod status;

pub use manage::{run_check, run_cleanup, run_clear, run_reprocess};
pub use run::run_sync_command;
pub use status::run_status;

use crate::error::CliError;
use corpus_sync_domain::{DocumentKey, DocumentPath, SourceTag};
use corpus_sync_shared::ErrorEnvelope;

/// Parse a `(source, path)` pair from CLI arguments.
pub(crate) fn parse_document_key(source: &str, path: &str) -> Result<DocumentKey, CliError> {
    let source_tag = SourceTag::parse(source)
        .map_err(ErrorEnvelope::from)
        .map_err(CliError::from)?;
    let document_path = DocumentPath::parse(path)
        .map_err(ErrorEnvelope::from)
        .map_err(CliError::from)?;
    Ok(DocumentKey::new(source_tag, document_path))
}

/// Serialize a value as pretty JSON for `--json` output.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|error| {
        CliError::from(ErrorEnvelope::unexpected(
            corpus_sync_shared::ErrorCode::internal(),
            format!("failed to serialize output: {error}"),
            corpus_sync_shared::ErrorClass::NonRetriable,
        ))
    })?;
    println!("{rendered}");
    Ok(())
}
