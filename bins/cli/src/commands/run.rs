//! Run command handler.

use super::print_json;
use crate::error::CliError;
use crate::wiring::{build_run_deps, build_run_input};
use corpus_sync_config::SyncConfig;
use corpus_sync_domain::RunSummary;
use corpus_sync_shared::RequestContext;

/// Run one incremental sync and print the summary.
pub async fn run_sync_command(
    ctx: &RequestContext,
    config: &SyncConfig,
    json: bool,
) -> Result<(), CliError> {
    let deps = build_run_deps(config)?;
    let input = build_run_input(config)?;

    let summary = corpus_sync_app::run_sync(ctx, &deps, input).await?;

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }

    if summary.completed {
        Ok(())
    } else {
        Err(CliError::from(corpus_sync_shared::ErrorEnvelope::unexpected(
            corpus_sync_shared::ErrorCode::store_unavailable(),
            "run aborted early; see the summary above",
            corpus_sync_shared::ErrorClass::Retriable,
        )))
    }
}

fn print_summary(summary: &RunSummary) {
    println!("run: {}", summary.run_id);
    println!(
        "new: {} | modified: {} | unchanged: {} | removed: {} | failed: {}",
        summary.added, summary.modified, summary.unchanged, summary.removed, summary.failed
    );
    println!(
        "embedded segments: {} (baseline {}, saved {:.1}%)",
        summary.embedded_segments,
        summary.baseline_segments,
        summary.compute_savings_percent()
    );
    if let (Some(initial), Some(final_count)) =
        (summary.initial_vector_count, summary.final_vector_count)
    {
        println!("vectors: {initial} -> {final_count}");
    }
    println!("duration: {}ms", summary.duration_ms());
    if !summary.completed {
        println!("status: aborted early");
    }
}
