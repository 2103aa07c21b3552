//! One end-to-end incremental sync run.
//!
//! Phases: scan the corpus, plan the diff against the tracking store, then
//! process and synchronize interleaved — embedding fans out through a
//! bounded worker pool while a single synchronization lane drains results in
//! arrival order. The run holds an exclusive lock from scan to finalize.

mod differ;
mod processor;
mod scanner;
mod synchronizer;
#[cfg(test)]
pub(crate) mod test_support;
mod types;

pub use types::{SyncRunDeps, SyncRunInput};

use corpus_sync_domain::{ChangeKind, DocumentKey, DocumentRecord, RunSummary, WorkPlan};
use corpus_sync_ports::{LoggerPort, RunLockPort, TrackingStorePort, VectorStorePort};
use corpus_sync_shared::{
    BoundedQueue, CancellationToken, ErrorCode, ErrorEnvelope, RequestContext, Result, WorkerPool,
    WorkerPoolOptions,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use types::{now_epoch_ms, SyncMessage, SyncStats};

/// Run one incremental sync: snapshot, diff, process, synchronize, finalize.
///
/// Per-document failures never abort the run; they land on the document's
/// record. The run aborts early only when a storage backend is globally
/// unreachable (the summary then reports `completed = false`) or when the
/// caller cancels `ctx` (which returns the cancellation error).
pub async fn run_sync(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    input: SyncRunInput,
) -> Result<RunSummary> {
    ctx.ensure_not_cancelled("sync_run.start")?;
    let _lock_guard = deps.run_lock.acquire()?;
    let started_at_ms = now_epoch_ms();

    if let Some(logger) = deps.logger.as_ref() {
        logger.info("sync.run.started", "sync run started", None);
    }

    // A count doubles as the reachability probe: abort before planning when
    // the vector store is down, rather than failing every document.
    let initial_vector_count = match deps.vector_store.count(ctx).await {
        Ok(count) => Some(count),
        Err(error) if error.is_store_unavailable() => return Err(error),
        Err(_) => None,
    };

    let tracked = tracked_by_key(deps.tracking.list(ctx, None).await?);
    let scanned = scanner::scan_corpus(ctx, deps, &tracked).await?;
    let plan = differ::build_plan(scanned, &tracked);

    if let Some(logger) = deps.logger.as_ref() {
        logger.info("sync.run.planned", "work plan computed", Some(plan_fields(&plan)));
    }

    let stats = if plan.is_empty() {
        SyncStats::default()
    } else {
        execute_plan(ctx, deps, input, &plan).await?
    };

    if ctx.is_cancelled() {
        return Err(ErrorEnvelope::cancelled("operation cancelled")
            .with_metadata("operation", "sync_run"));
    }

    let final_vector_count = deps.vector_store.count(ctx).await.ok();
    let summary = RunSummary {
        run_id: ctx.correlation_id().as_str().to_owned().into_boxed_str(),
        started_at_ms,
        finished_at_ms: now_epoch_ms(),
        added: stats.added,
        modified: stats.modified,
        unchanged: plan.unchanged,
        removed: stats.removed,
        failed: stats.failed,
        embedded_segments: stats.embedded_segments,
        baseline_segments: plan.unchanged_segments + stats.embedded_segments,
        initial_vector_count,
        final_vector_count,
        completed: stats.abort_error.is_none(),
    };

    if let Some(logger) = deps.logger.as_ref() {
        if summary.completed {
            logger.info(
                "sync.run.completed",
                "sync run completed",
                Some(summary_fields(&summary)),
            );
        } else {
            logger.error(
                "sync.run.aborted",
                "sync run aborted early",
                Some(summary_fields(&summary)),
            );
        }
    }

    Ok(summary)
}

/// Fan the plan out to workers and drain results through the single writer.
async fn execute_plan(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    input: SyncRunInput,
    plan: &WorkPlan,
) -> Result<SyncStats> {
    // The pipeline has its own cancellation scope so a storage abort stops
    // the workers without cancelling the caller's context.
    let pipeline_token = CancellationToken::new();
    let pipeline_ctx =
        RequestContext::with_cancellation(ctx.correlation_id().clone(), pipeline_token.clone());
    let outer_token = ctx.cancellation_token();
    let forward_token = pipeline_token.clone();
    let cancel_forwarder = tokio::spawn(async move {
        outer_token.cancelled().await;
        forward_token.cancel();
    });

    let queue_capacity = input
        .queue_capacity
        .map(std::num::NonZeroUsize::get)
        .unwrap_or_else(|| input.max_workers.get().saturating_mul(2))
        .max(1);
    let queue: BoundedQueue<SyncMessage> = BoundedQueue::new(queue_capacity)?;

    let writer = spawn_writer(pipeline_ctx.clone(), deps.clone(), queue.clone());

    // Removals first, mirroring cleanup-before-embed in the update flow.
    for removed in plan.to_remove.clone() {
        if queue
            .enqueue(&pipeline_ctx, SyncMessage::Removal(removed))
            .await
            .is_err()
        {
            break;
        }
    }

    let pool = Arc::new(WorkerPool::new(
        pipeline_ctx.clone(),
        WorkerPoolOptions {
            concurrency: input.max_workers.get(),
            queue_capacity: None,
        },
    )?);

    let mut producers = tokio::task::JoinSet::new();
    for planned in plan.to_process.clone() {
        let pool = Arc::clone(&pool);
        let queue = queue.clone();
        let deps = deps.clone();
        let ctx = pipeline_ctx.clone();
        producers.spawn(async move {
            let planned_for_failure = planned.clone();
            let task_ctx = ctx.clone();
            let task_deps = deps.clone();
            let outcome = pool
                .submit(move || async move {
                    processor::process_document(&task_ctx, &task_deps, &input, planned).await
                })
                .await;

            match outcome {
                Ok(processed) => {
                    let _ = queue
                        .enqueue(&ctx, SyncMessage::Update(processed))
                        .await;
                },
                Err(error) if error.is_cancelled() => {},
                Err(error) => {
                    let _ = queue
                        .enqueue(
                            &ctx,
                            SyncMessage::Failure {
                                planned: planned_for_failure,
                                error,
                            },
                        )
                        .await;
                },
            }
        });
    }

    while producers.join_next().await.is_some() {}
    pool.stop().await;
    queue.close().await;

    let stats = writer.await.map_err(|join_error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("synchronizer task failed: {join_error}"),
            corpus_sync_shared::ErrorClass::NonRetriable,
        )
    })?;

    cancel_forwarder.abort();
    Ok(stats)
}

/// The single writer: applies messages in arrival order, one at a time.
fn spawn_writer(
    ctx: RequestContext,
    deps: SyncRunDeps,
    queue: BoundedQueue<SyncMessage>,
) -> tokio::task::JoinHandle<SyncStats> {
    tokio::spawn(async move {
        let mut stats = SyncStats::default();
        loop {
            let Ok(message) = queue.dequeue(&ctx).await else {
                // Closed and drained, or cancelled.
                break;
            };
            handle_message(&ctx, &deps, message, &mut stats).await;
            if stats.abort_error.is_some() {
                ctx.cancel();
                break;
            }
        }
        stats
    })
}

async fn handle_message(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    message: SyncMessage,
    stats: &mut SyncStats,
) {
    match message {
        SyncMessage::Update(processed) => {
            let kind = processed.planned.kind;
            match synchronizer::apply_update(ctx, deps, processed).await {
                Ok(segment_count) => {
                    match kind {
                        ChangeKind::New => stats.added += 1,
                        ChangeKind::Modified => stats.modified += 1,
                        ChangeKind::Unchanged | ChangeKind::Removed => {},
                    }
                    stats.embedded_segments += segment_count as u64;
                },
                Err(error) => record_write_error(stats, error),
            }
        },
        SyncMessage::Failure { planned, error } => {
            stats.failed += 1;
            if let Err(commit_error) = synchronizer::apply_failure(ctx, deps, planned, &error).await
            {
                if commit_error.is_store_unavailable() {
                    stats.abort_error = Some(commit_error);
                }
            }
        },
        SyncMessage::Removal(removed) => {
            match synchronizer::apply_removal(ctx, deps, removed).await {
                Ok(()) => stats.removed += 1,
                Err(error) => record_write_error(stats, error),
            }
        },
    }
}

fn record_write_error(stats: &mut SyncStats, error: ErrorEnvelope) {
    if error.is_cancelled() {
        return;
    }
    stats.failed += 1;
    if error.is_store_unavailable() {
        stats.abort_error = Some(error);
    }
}

fn tracked_by_key(records: Vec<DocumentRecord>) -> BTreeMap<DocumentKey, DocumentRecord> {
    records
        .into_iter()
        .map(|record| (record.key(), record))
        .collect()
}

fn plan_fields(plan: &WorkPlan) -> corpus_sync_ports::LogFields {
    let mut fields = corpus_sync_ports::LogFields::new();
    fields.insert(
        "new".into(),
        serde_json::Value::from(plan.count_of(ChangeKind::New)),
    );
    fields.insert(
        "modified".into(),
        serde_json::Value::from(plan.count_of(ChangeKind::Modified)),
    );
    fields.insert("removed".into(), serde_json::Value::from(plan.to_remove.len()));
    fields.insert("unchanged".into(), serde_json::Value::from(plan.unchanged));
    fields
}


fn summary_fields(summary: &RunSummary) -> corpus_sync_ports::LogFields {
    let mut fields = corpus_sync_ports::LogFields::new();
    fields.insert("added".into(), serde_json::Value::from(summary.added));
    fields.insert("modified".into(), serde_json::Value::from(summary.modified));
    fields.insert("unchanged".into(), serde_json::Value::from(summary.unchanged));
    fields.insert("removed".into(), serde_json::Value::from(summary.removed));
    fields.insert("failed".into(), serde_json::Value::from(summary.failed));
    fields.insert(
        "embeddedSegments".into(),
        serde_json::Value::from(summary.embedded_segments),
    );
    fields.insert(
        "savingsPercent".into(),
        serde_json::Value::from(summary.compute_savings_percent()),
    );
    fields.insert(
        "durationMs".into(),
        serde_json::Value::from(summary.duration_ms()),
    );
    fields
}
