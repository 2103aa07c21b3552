//! End-to-end sync runs over real adapters: filesystem corpus, SQLite
//! tracking store, in-memory vector store, deterministic embedding.

use corpus_sync_adapters::{
    CharacterSplitter, FileRunLock, FsCorpus, FsCorpusSource, HashedEmbedding, MemoryVectorStore,
    SqliteTrackingStore,
};
use corpus_sync_app::{run_sync, SyncRunDeps, SyncRunInput};
use corpus_sync_domain::{DocumentKey, DocumentPath, DocumentStatus, SourceTag};
use corpus_sync_ports::{RunLockPort, TrackingStorePort, VectorStorePort};
use corpus_sync_shared::{ErrorCode, RequestContext, Result, RetryPolicy};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_root(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

fn tag() -> SourceTag {
    SourceTag::parse("vosdroits").expect("tag")
}

fn key(path: &str) -> DocumentKey {
    DocumentKey::new(tag(), DocumentPath::parse(path).expect("path"))
}

struct Harness {
    root: PathBuf,
    deps: SyncRunDeps,
    store: MemoryVectorStore,
}

impl Harness {
    fn new(prefix: &str) -> Self {
        let root = temp_root(prefix);
        std::fs::create_dir_all(&root).expect("create corpus root");

        let corpus = FsCorpus::new(vec![FsCorpusSource {
            tag: tag(),
            root_dir: root.join("data"),
        }])
        .expect("corpus");
        std::fs::create_dir_all(root.join("data")).expect("create data dir");

        let store = MemoryVectorStore::new();
        let deps = SyncRunDeps {
            corpus: Arc::new(corpus),
            tracking: Arc::new(SqliteTrackingStore::new(root.join("tracking.sqlite3"))),
            vector_store: Arc::new(store.clone()),
            embedding: Arc::new(HashedEmbedding::new(16).expect("embedding")),
            splitter: Arc::new(CharacterSplitter::new(40, 8).expect("splitter")),
            run_lock: Arc::new(FileRunLock::new(root.join("run.lock"))),
            logger: None,
        };
        Self { root, deps, store }
    }

    fn write(&self, path: &str, body: &str) {
        let absolute = self.root.join("data").join(path);
        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&absolute, format!("<doc>{body}</doc>")).expect("write document");
        // Nudge mtime forward so edits within one test are always visible to
        // the metadata pre-filter.
        bump_mtime(&absolute);
    }

    fn delete(&self, path: &str) {
        std::fs::remove_file(self.root.join("data").join(path)).expect("delete document");
    }

    async fn run(&self) -> Result<corpus_sync_domain::RunSummary> {
        run_sync(&RequestContext::new_run(), &self.deps, input()).await
    }
}

fn bump_mtime(path: &Path) {
    let file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for mtime bump");
    let now = SystemTime::now();
    let _ = file.set_modified(now + std::time::Duration::from_millis(next_bump()));
}

fn next_bump() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static BUMP: AtomicU64 = AtomicU64::new(0);
    BUMP.fetch_add(1_000, Ordering::Relaxed)
}

fn input() -> SyncRunInput {
    SyncRunInput {
        max_workers: NonZeroUsize::new(4).expect("workers"),
        queue_capacity: None,
        embedding_batch_size: NonZeroUsize::new(4).expect("batch"),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ratio_pct: 0,
        },
    }
}

#[tokio::test]
async fn three_document_scenario_matches_the_expected_lifecycle() -> Result<()> {
    let harness = Harness::new("sync-scenario");
    harness.write("A.xml", "hello");
    harness.write("B.xml", "world");
    harness.write("C.xml", "foo");

    // Run 1: everything is new.
    let first = harness.run().await?;
    assert_eq!(
        (first.added, first.modified, first.removed, first.unchanged),
        (3, 0, 0, 0)
    );
    assert!(first.completed);
    let ctx = RequestContext::new_run();
    assert!(harness.store.count(&ctx).await? >= 3);

    // Run 2: nothing changed.
    let second = harness.run().await?;
    assert_eq!(
        (second.added, second.modified, second.removed, second.unchanged),
        (0, 0, 0, 3)
    );
    assert_eq!(second.embedded_segments, 0);
    assert!(second.compute_savings_percent() > 99.0);

    // Delete B, modify C.
    let before_b = harness
        .deps
        .tracking
        .get(&ctx, key("B.xml"))
        .await?
        .expect("B tracked");
    harness.delete("B.xml");
    harness.write("C.xml", "foobar");

    let third = harness.run().await?;
    assert_eq!(
        (third.added, third.modified, third.removed, third.unchanged),
        (0, 1, 1, 1)
    );

    // B's vectors and record are gone.
    assert_eq!(harness.deps.tracking.get(&ctx, key("B.xml")).await?, None);
    let remaining = harness.store.keys()?;
    for stale in &before_b.segment_keys {
        assert!(!remaining.contains(stale), "stale B segment: {stale}");
    }

    // C reflects the new content hash; A is untouched.
    let c_record = harness
        .deps
        .tracking
        .get(&ctx, key("C.xml"))
        .await?
        .expect("C tracked");
    assert_eq!(
        c_record.content_hash.as_str(),
        corpus_sync_domain::ContentHash::compute(b"<doc>foobar</doc>").as_str()
    );
    let a_record = harness
        .deps
        .tracking
        .get(&ctx, key("A.xml"))
        .await?
        .expect("A tracked");
    assert_eq!(a_record.status, DocumentStatus::Processed);
    Ok(())
}

#[tokio::test]
async fn one_byte_edits_are_detected_and_reverts_restore_the_hash() -> Result<()> {
    let harness = Harness::new("sync-onebyte");
    harness.write("doc.xml", "contenu original");
    harness.run().await?;

    let ctx = RequestContext::new_run();
    let original = harness
        .deps
        .tracking
        .get(&ctx, key("doc.xml"))
        .await?
        .expect("tracked");

    harness.write("doc.xml", "contenu originel");
    let edited = harness.run().await?;
    assert_eq!(edited.modified, 1);

    let changed = harness
        .deps
        .tracking
        .get(&ctx, key("doc.xml"))
        .await?
        .expect("tracked");
    assert_ne!(changed.content_hash, original.content_hash);

    harness.write("doc.xml", "contenu original");
    let reverted = harness.run().await?;
    assert_eq!(reverted.modified, 1);

    let restored = harness
        .deps
        .tracking
        .get(&ctx, key("doc.xml"))
        .await?
        .expect("tracked");
    assert_eq!(restored.content_hash, original.content_hash);
    assert_eq!(restored.segment_keys.len(), original.segment_keys.len());
    Ok(())
}

#[tokio::test]
async fn shrinking_a_document_leaves_no_stale_vectors() -> Result<()> {
    let harness = Harness::new("sync-shrink");
    let long_body = (0..40).map(|n| format!("mot{n}")).collect::<Vec<_>>().join(" ");
    harness.write("doc.xml", &long_body);
    harness.run().await?;

    let ctx = RequestContext::new_run();
    let before = harness
        .deps
        .tracking
        .get(&ctx, key("doc.xml"))
        .await?
        .expect("tracked");
    assert!(before.segment_keys.len() > 1, "test needs multiple chunks");

    harness.write("doc.xml", "court");
    let summary = harness.run().await?;
    assert_eq!(summary.modified, 1);

    let after = harness
        .deps
        .tracking
        .get(&ctx, key("doc.xml"))
        .await?
        .expect("tracked");
    assert_eq!(after.segment_keys.len(), 1);
    assert_eq!(harness.store.count(&ctx).await?, 1);
    assert_eq!(harness.store.keys()?, after.segment_keys);
    Ok(())
}

#[tokio::test]
async fn record_segment_keys_mirror_the_vector_store() -> Result<()> {
    let harness = Harness::new("sync-mirror");
    harness.write("a.xml", "premier document avec un peu de texte");
    harness.write("b.xml", "second document");
    harness.run().await?;

    let ctx = RequestContext::new_run();
    let records = harness.deps.tracking.list(&ctx, None).await?;
    let mut tracked_keys: Vec<_> = records
        .iter()
        .flat_map(|record| record.segment_keys.iter().cloned())
        .collect();
    tracked_keys.sort();
    assert_eq!(harness.store.keys()?, tracked_keys);
    Ok(())
}

#[tokio::test]
async fn concurrent_runs_fail_fast_on_the_lock() -> Result<()> {
    let harness = Harness::new("sync-lock");
    harness.write("a.xml", "texte");

    let guard = harness.deps.run_lock.acquire()?;
    let error = match harness.run().await {
        Err(error) => error,
        Ok(_) => panic!("expected lock contention"),
    };
    assert_eq!(error.code, ErrorCode::run_lock_held());

    drop(guard);
    let summary = harness.run().await?;
    assert_eq!(summary.added, 1);
    Ok(())
}

#[tokio::test]
async fn empty_documents_are_processed_with_zero_segments() -> Result<()> {
    let harness = Harness::new("sync-empty");
    harness.write("meta.xml", "");
    let summary = harness.run().await?;
    assert_eq!(summary.added, 1);

    let ctx = RequestContext::new_run();
    let record = harness
        .deps
        .tracking
        .get(&ctx, key("meta.xml"))
        .await?
        .expect("tracked");
    assert_eq!(record.status, DocumentStatus::Processed);
    assert!(record.segment_keys.is_empty());
    assert_eq!(harness.store.count(&ctx).await?, 0);
    Ok(())
}
