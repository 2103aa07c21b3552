//! Check, reprocess, clear, and cleanup command handlers.

use super::{parse_document_key, print_json};
use crate::error::CliError;
use crate::wiring::build_manage_deps;
use corpus_sync_app::{check_document, cleanup_orphans, clear_tracking, reprocess_document};
use corpus_sync_config::SyncConfig;
use corpus_sync_shared::{ErrorEnvelope, RequestContext};
use std::io::Write;

/// Show one document's tracked state.
pub async fn run_check(
    ctx: &RequestContext,
    config: &SyncConfig,
    json: bool,
    source: &str,
    path: &str,
) -> Result<(), CliError> {
    let deps = build_manage_deps(config)?;
    let key = parse_document_key(source, path)?;
    let record = check_document(ctx, &deps, key).await?;

    if json {
        return print_json(&record);
    }
    match record {
        Some(record) => {
            println!("status: {}", record.status);
            println!("content hash: {}", record.content_hash);
            println!("modified at (ms): {}", record.modified_at_ms);
            println!("segments: {}", record.segment_keys.len());
            println!("failures: {}", record.failure_count);
            match record.last_processed_at_ms {
                Some(at) => println!("processed at (ms): {at}"),
                None => println!("processed at: never"),
            }
        },
        None => println!("status: not tracked"),
    }
    Ok(())
}

/// Reset one document to pending.
pub async fn run_reprocess(
    ctx: &RequestContext,
    config: &SyncConfig,
    json: bool,
    source: &str,
    path: &str,
) -> Result<(), CliError> {
    let deps = build_manage_deps(config)?;
    let key = parse_document_key(source, path)?;
    let reset = reprocess_document(ctx, &deps, key).await?;

    if json {
        return print_json(&serde_json::json!({ "reset": reset }));
    }
    if reset {
        println!("document reset to pending; the next run will reprocess it");
    } else {
        println!("document is not tracked");
    }
    Ok(())
}

/// Clear all tracking state after confirmation.
pub async fn run_clear(
    ctx: &RequestContext,
    config: &SyncConfig,
    json: bool,
    yes: bool,
) -> Result<(), CliError> {
    if !yes && !confirm("Clear all tracking data? The next run reprocesses everything. [y/N] ")? {
        println!("cancelled");
        return Ok(());
    }

    let deps = build_manage_deps(config)?;
    clear_tracking(ctx, &deps).await?;

    if json {
        return print_json(&serde_json::json!({ "cleared": true }));
    }
    println!("tracking store cleared");
    Ok(())
}

/// Remove orphaned tracking entries and their vectors.
pub async fn run_cleanup(
    ctx: &RequestContext,
    config: &SyncConfig,
    json: bool,
) -> Result<(), CliError> {
    let deps = build_manage_deps(config)?;
    let outcome = cleanup_orphans(ctx, &deps).await?;

    if json {
        return print_json(&outcome);
    }
    println!(
        "removed {} orphaned records and {} segments",
        outcome.removed_records, outcome.removed_segments
    );
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{prompt}");
    std::io::stdout().flush().map_err(to_cli_error)?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(to_cli_error)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn to_cli_error(error: std::io::Error) -> CliError {
    CliError::from(
        ErrorEnvelope::from(error).with_metadata("operation", "confirm_prompt"),
    )
}
