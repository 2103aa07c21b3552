//! SQLite tracking store adapter.
//!
//! One durable table keyed by `(source_tag, path)`. Connections are opened
//! per operation on the blocking pool; WAL journaling plus a generous busy
//! timeout keep concurrent readers (status queries during a run) from
//! tripping over the writer.

use corpus_sync_domain::{
    ContentHash, DocumentKey, DocumentPath, DocumentRecord, DocumentStatus, SegmentKey, SourceTag,
    TrackingCounts,
};
use corpus_sync_ports::{BoxFuture, TrackingStorePort};
use corpus_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;

const SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT_MS: u64 = 30_000;

/// SQLite-backed tracking store.
#[derive(Debug, Clone)]
pub struct SqliteTrackingStore {
    path: PathBuf,
}

impl SqliteTrackingStore {
    /// Create a store backed by the database at `path`.
    ///
    /// The file and its parent directories are created lazily on first use.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        spawn_blocking(move || {
            let conn = open_connection(&path)?;
            op(&conn)
        })
        .await
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                format!("tracking store task failed: {error}"),
                ErrorClass::NonRetriable,
            )
        })?
    }
}

impl TrackingStorePort for SqliteTrackingStore {
    fn get(
        &self,
        ctx: &RequestContext,
        key: DocumentKey,
    ) -> BoxFuture<'_, Result<Option<DocumentRecord>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("tracking.get")?;
            self.with_connection(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT source_tag, path, modified_at_ms, content_hash, status, \
                         segment_keys, last_processed_at_ms, failure_count \
                         FROM document_tracking WHERE source_tag = ?1 AND path = ?2",
                        (key.source_tag.as_str(), key.path.as_str()),
                        row_to_raw,
                    )
                    .optional()
                    .map_err(|error| query_error("get", &error))?;
                row.map(decode_record).transpose()
            })
            .await
        })
    }

    fn upsert(&self, ctx: &RequestContext, record: DocumentRecord) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("tracking.upsert")?;
            self.with_connection(move |conn| {
                let segment_keys = encode_segment_keys(&record.segment_keys)?;
                conn.execute(
                    "INSERT OR REPLACE INTO document_tracking \
                     (source_tag, path, modified_at_ms, content_hash, status, segment_keys, \
                      last_processed_at_ms, failure_count) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    (
                        record.source_tag.as_str(),
                        record.path.as_str(),
                        i64::try_from(record.modified_at_ms).unwrap_or(i64::MAX),
                        record.content_hash.as_str(),
                        record.status.as_str(),
                        segment_keys,
                        record
                            .last_processed_at_ms
                            .map(|value| i64::try_from(value).unwrap_or(i64::MAX)),
                        i64::from(record.failure_count),
                    ),
                )
                .map_err(|error| query_error("upsert", &error))?;
                Ok(())
            })
            .await
        })
    }

    fn remove(&self, ctx: &RequestContext, key: DocumentKey) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("tracking.remove")?;
            self.with_connection(move |conn| {
                conn.execute(
                    "DELETE FROM document_tracking WHERE source_tag = ?1 AND path = ?2",
                    (key.source_tag.as_str(), key.path.as_str()),
                )
                .map_err(|error| query_error("remove", &error))?;
                Ok(())
            })
            .await
        })
    }

    fn list(
        &self,
        ctx: &RequestContext,
        source_tag: Option<SourceTag>,
    ) -> BoxFuture<'_, Result<Vec<DocumentRecord>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("tracking.list")?;
            self.with_connection(move |conn| {
                let raw_rows = match source_tag {
                    Some(tag) => collect_rows(
                        conn,
                        "SELECT source_tag, path, modified_at_ms, content_hash, status, \
                         segment_keys, last_processed_at_ms, failure_count \
                         FROM document_tracking WHERE source_tag = ?1 \
                         ORDER BY source_tag, path",
                        Some(tag.as_str().to_owned()),
                    )?,
                    None => collect_rows(
                        conn,
                        "SELECT source_tag, path, modified_at_ms, content_hash, status, \
                         segment_keys, last_processed_at_ms, failure_count \
                         FROM document_tracking ORDER BY source_tag, path",
                        None,
                    )?,
                };
                raw_rows.into_iter().map(decode_record).collect()
            })
            .await
        })
    }

    fn counts(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<TrackingCounts>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("tracking.counts")?;
            self.with_connection(|conn| {
                let raw_rows = collect_rows(
                    conn,
                    "SELECT source_tag, path, modified_at_ms, content_hash, status, \
                     segment_keys, last_processed_at_ms, failure_count \
                     FROM document_tracking ORDER BY source_tag, path",
                    None,
                )?;

                let mut counts = TrackingCounts::default();
                for raw in raw_rows {
                    let record = decode_record(raw)?;
                    counts.total += 1;
                    *counts.by_status.entry(record.status).or_insert(0) += 1;
                    *counts
                        .by_source
                        .entry(record.source_tag.clone())
                        .or_insert(0) += 1;
                    counts.total_segments += record.segment_keys.len() as u64;
                    if let Some(processed_at) = record.last_processed_at_ms {
                        let newest = counts.last_processed_at_ms.unwrap_or(0);
                        if processed_at > newest {
                            counts.last_processed_at_ms = Some(processed_at);
                        }
                    }
                }
                Ok(counts)
            })
            .await
        })
    }

    fn clear(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("tracking.clear")?;
            self.with_connection(|conn| {
                conn.execute("DELETE FROM document_tracking", [])
                    .map_err(|error| query_error("clear", &error))?;
                Ok(())
            })
            .await
        })
    }
}

type RawRow = (
    String,
    String,
    i64,
    String,
    String,
    String,
    Option<i64>,
    i64,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn collect_rows(conn: &Connection, sql: &str, parameter: Option<String>) -> Result<Vec<RawRow>> {
    let mut statement = conn
        .prepare(sql)
        .map_err(|error| query_error("prepare", &error))?;
    let mapped = match parameter {
        Some(parameter) => statement
            .query_map([parameter], row_to_raw)
            .map_err(|error| query_error("list", &error))?
            .collect::<rusqlite::Result<Vec<_>>>(),
        None => statement
            .query_map([], row_to_raw)
            .map_err(|error| query_error("list", &error))?
            .collect::<rusqlite::Result<Vec<_>>>(),
    };
    mapped.map_err(|error| query_error("list", &error))
}

/// Decode a raw row, validating every field at the storage boundary.
fn decode_record(raw: RawRow) -> Result<DocumentRecord> {
    let (source_tag, path, modified_at_ms, content_hash, status, segment_keys, processed_at, failures) =
        raw;

    let source_tag = SourceTag::parse(&source_tag).map_err(ErrorEnvelope::from)?;
    let path = DocumentPath::parse(&path).map_err(ErrorEnvelope::from)?;
    let content_hash = ContentHash::parse(&content_hash).map_err(ErrorEnvelope::from)?;
    let status = DocumentStatus::parse(&status).ok_or_else(|| {
        ErrorEnvelope::invariant(
            ErrorCode::new("tracking", "invalid_status"),
            format!("unknown document status in tracking store: {status}"),
        )
    })?;
    let segment_keys = decode_segment_keys(&segment_keys)?;

    Ok(DocumentRecord {
        source_tag,
        path,
        modified_at_ms: u64::try_from(modified_at_ms).unwrap_or(0),
        content_hash,
        segment_keys,
        status,
        last_processed_at_ms: processed_at.and_then(|value| u64::try_from(value).ok()),
        failure_count: u32::try_from(failures).unwrap_or(0),
    })
}

fn encode_segment_keys(keys: &[SegmentKey]) -> Result<String> {
    let raw: Vec<&str> = keys.iter().map(SegmentKey::as_str).collect();
    serde_json::to_string(&raw).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to encode segment keys: {error}"),
            ErrorClass::NonRetriable,
        )
    })
}

fn decode_segment_keys(raw: &str) -> Result<Vec<SegmentKey>> {
    let decoded: Vec<String> = serde_json::from_str(raw).map_err(|error| {
        ErrorEnvelope::invariant(
            ErrorCode::new("tracking", "invalid_segment_keys"),
            format!("failed to decode segment keys: {error}"),
        )
    })?;
    decoded
        .into_iter()
        .map(|key| SegmentKey::parse(&key).map_err(ErrorEnvelope::from))
        .collect()
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|error| {
                store_unavailable(&format!("tracking store mkdir failed: {error}"))
            })?;
        }
    }

    let conn = Connection::open(path)
        .map_err(|error| store_unavailable(&format!("tracking store open failed: {error}")))?;

    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
        .map_err(|error| store_unavailable(&format!("tracking store busy timeout failed: {error}")))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(|error| store_unavailable(&format!("tracking store pragma failed: {error}")))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS document_tracking (
            source_tag TEXT NOT NULL,
            path TEXT NOT NULL,
            modified_at_ms INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            status TEXT NOT NULL,
            segment_keys TEXT NOT NULL,
            last_processed_at_ms INTEGER,
            failure_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (source_tag, path)
         );",
    )
    .map_err(|error| store_unavailable(&format!("tracking store schema failed: {error}")))?;

    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|error| store_unavailable(&format!("tracking store version failed: {error}")))?;
    if version == 0 {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
            .map_err(|error| {
                store_unavailable(&format!("tracking store version set failed: {error}"))
            })?;
    } else if version != SCHEMA_VERSION {
        return Err(ErrorEnvelope::invariant(
            ErrorCode::new("tracking", "schema_version_mismatch"),
            "tracking store schema version mismatch",
        )
        .with_metadata("found", version.to_string())
        .with_metadata("expected", SCHEMA_VERSION.to_string()));
    }

    Ok(conn)
}

fn store_unavailable(message: &str) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::store_unavailable(),
        message.to_owned(),
        ErrorClass::Retriable,
    )
}

fn query_error(operation: &str, error: &rusqlite::Error) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("tracking", "query_failed"),
        format!("tracking store {operation} failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{nanos}.sqlite3"))
    }

    fn record(path: &str, status: DocumentStatus) -> DocumentRecord {
        let source_tag = SourceTag::parse("vosdroits").expect("tag");
        let document_path = DocumentPath::parse(path).expect("path");
        let mut record = DocumentRecord::new_pending(
            source_tag.clone(),
            document_path.clone(),
            1_000,
            ContentHash::compute(path.as_bytes()),
        );
        if status == DocumentStatus::Processed {
            record.mark_processed(
                vec![
                    SegmentKey::derive(&source_tag, &document_path, 0),
                    SegmentKey::derive(&source_tag, &document_path, 1),
                ],
                2_000,
            );
        } else if status == DocumentStatus::Failed {
            record.mark_failed();
        }
        record
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() -> Result<()> {
        let store = SqliteTrackingStore::new(temp_db("tracking-roundtrip"));
        let ctx = RequestContext::new_run();

        let stored = record("F100.xml", DocumentStatus::Processed);
        store.upsert(&ctx, stored.clone()).await?;

        let fetched = store.get(&ctx, stored.key()).await?;
        assert_eq!(fetched, Some(stored));
        Ok(())
    }

    #[tokio::test]
    async fn missing_records_come_back_none() -> Result<()> {
        let store = SqliteTrackingStore::new(temp_db("tracking-missing"));
        let ctx = RequestContext::new_run();

        let absent = record("nope.xml", DocumentStatus::Pending);
        assert_eq!(store.get(&ctx, absent.key()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_existing_rows() -> Result<()> {
        let store = SqliteTrackingStore::new(temp_db("tracking-replace"));
        let ctx = RequestContext::new_run();

        let mut stored = record("F100.xml", DocumentStatus::Pending);
        store.upsert(&ctx, stored.clone()).await?;
        stored.mark_failed();
        store.upsert(&ctx, stored.clone()).await?;

        let fetched = store.get(&ctx, stored.key()).await?;
        assert_eq!(fetched.map(|record| record.failure_count), Some(1));

        let counts = store.counts(&ctx).await?;
        assert_eq!(counts.total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn remove_and_clear_delete_rows() -> Result<()> {
        let store = SqliteTrackingStore::new(temp_db("tracking-remove"));
        let ctx = RequestContext::new_run();

        let first = record("F100.xml", DocumentStatus::Processed);
        let second = record("F200.xml", DocumentStatus::Processed);
        store.upsert(&ctx, first.clone()).await?;
        store.upsert(&ctx, second.clone()).await?;

        store.remove(&ctx, first.key()).await?;
        assert_eq!(store.get(&ctx, first.key()).await?, None);
        assert!(store.get(&ctx, second.key()).await?.is_some());

        // Removing an absent record is a no-op.
        store.remove(&ctx, first.key()).await?;

        store.clear(&ctx).await?;
        assert_eq!(store.counts(&ctx).await?.total, 0);
        Ok(())
    }

    #[tokio::test]
    async fn list_filters_by_source_and_orders_by_path() -> Result<()> {
        let store = SqliteTrackingStore::new(temp_db("tracking-list"));
        let ctx = RequestContext::new_run();

        store
            .upsert(&ctx, record("F200.xml", DocumentStatus::Processed))
            .await?;
        store
            .upsert(&ctx, record("F100.xml", DocumentStatus::Failed))
            .await?;

        let other_tag = SourceTag::parse("entreprendre").expect("tag");
        let mut other = record("F300.xml", DocumentStatus::Pending);
        other.source_tag = other_tag.clone();
        store.upsert(&ctx, other).await?;

        let all = store.list(&ctx, None).await?;
        assert_eq!(all.len(), 3);

        let filtered = store
            .list(&ctx, Some(SourceTag::parse("vosdroits").expect("tag")))
            .await?;
        let paths: Vec<&str> = filtered
            .iter()
            .map(|record| record.path.as_str())
            .collect();
        assert_eq!(paths, vec!["F100.xml", "F200.xml"]);
        Ok(())
    }

    #[tokio::test]
    async fn counts_aggregate_status_source_and_segments() -> Result<()> {
        let store = SqliteTrackingStore::new(temp_db("tracking-counts"));
        let ctx = RequestContext::new_run();

        store
            .upsert(&ctx, record("F100.xml", DocumentStatus::Processed))
            .await?;
        store
            .upsert(&ctx, record("F200.xml", DocumentStatus::Failed))
            .await?;

        let counts = store.counts(&ctx).await?;
        assert_eq!(counts.total, 2);
        assert_eq!(
            counts.by_status.get(&DocumentStatus::Processed).copied(),
            Some(1)
        );
        assert_eq!(
            counts.by_status.get(&DocumentStatus::Failed).copied(),
            Some(1)
        );
        assert_eq!(counts.total_segments, 2);
        assert_eq!(counts.last_processed_at_ms, Some(2_000));
        Ok(())
    }
}
