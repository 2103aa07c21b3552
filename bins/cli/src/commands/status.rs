//! Status command handler.

use super::print_json;
use crate::error::CliError;
use crate::wiring::build_manage_deps;
use corpus_sync_app::read_status;
use corpus_sync_config::SyncConfig;
use corpus_sync_domain::{DocumentRecord, SourceTag};
use corpus_sync_ports::TrackingStorePort;
use corpus_sync_shared::{ErrorEnvelope, RequestContext};

/// Show tracking-store and vector-store statistics, optionally with the
/// tracked document list.
pub async fn run_status(
    ctx: &RequestContext,
    config: &SyncConfig,
    json: bool,
    list: bool,
    source: Option<&str>,
) -> Result<(), CliError> {
    let deps = build_manage_deps(config)?;
    let report = read_status(ctx, &deps).await?;

    let source_tag = source
        .map(|raw| SourceTag::parse(raw).map_err(ErrorEnvelope::from))
        .transpose()?;
    let records = if list {
        Some(deps.tracking.list(ctx, source_tag).await?)
    } else {
        None
    };

    if json {
        let payload = serde_json::json!({
            "status": report,
            "documents": records,
        });
        return print_json(&payload);
    }

    println!("tracked documents: {}", report.tracking.total);
    println!("tracked segments: {}", report.tracking.total_segments);
    match report.vector_count {
        Some(count) => println!("vector store segments: {count}"),
        None => println!("vector store segments: <unreachable>"),
    }
    match report.tracking.last_processed_at_ms {
        Some(at) => println!("last processed (ms since epoch): {at}"),
        None => println!("last processed: never"),
    }
    for (status, count) in &report.tracking.by_status {
        println!("status {status}: {count}");
    }
    for (tag, count) in &report.tracking.by_source {
        println!("source {tag}: {count}");
    }

    if let Some(records) = records {
        println!();
        for record in records {
            print_record_line(&record);
        }
    }
    Ok(())
}

fn print_record_line(record: &DocumentRecord) {
    println!(
        "{}:{} [{}] segments={} failures={}",
        record.source_tag,
        record.path,
        record.status,
        record.segment_keys.len(),
        record.failure_count
    );
}
