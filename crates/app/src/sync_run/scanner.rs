//! Corpus scanning: one snapshot of entries with fresh content hashes.

use super::types::{ScannedDocument, SyncRunDeps};
use corpus_sync_domain::{ContentHash, DocumentKey, DocumentRecord, DocumentStatus};
use corpus_sync_ports::CorpusPort;
use corpus_sync_shared::{RequestContext, Result};
use std::collections::BTreeMap;

/// Scan the corpus against the tracked records.
///
/// Hashing is skipped only for documents whose tracked record carries the
/// same modification time *and* is `processed` — the documented
/// timestamp-only shortcut. Everything else gets hashed; the hash is the
/// authority for change detection.
pub async fn scan_corpus(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    tracked: &BTreeMap<DocumentKey, DocumentRecord>,
) -> Result<Vec<ScannedDocument>> {
    let entries = deps.corpus.list(ctx).await?;

    let mut scanned = Vec::with_capacity(entries.len());
    for entry in entries {
        ctx.ensure_not_cancelled("sync_run.scan")?;

        let key = DocumentKey::new(entry.source_tag.clone(), entry.path.clone());
        let existing = tracked.get(&key).cloned();

        if let Some(record) = existing.as_ref() {
            if record.status == DocumentStatus::Processed
                && record.modified_at_ms == entry.modified_at_ms
            {
                scanned.push(ScannedDocument {
                    entry,
                    content_hash: None,
                    read_failed: false,
                    existing,
                });
                continue;
            }
        }

        match deps
            .corpus
            .read_bytes(ctx, entry.source_tag.clone(), entry.path.clone())
            .await
        {
            Ok(bytes) => scanned.push(ScannedDocument {
                entry,
                content_hash: Some(ContentHash::compute(&bytes)),
                read_failed: false,
                existing,
            }),
            Err(error) => {
                if error.is_cancelled() {
                    return Err(error);
                }
                // Unreadable now; planned anyway so the processing stage can
                // surface the failure on the record.
                scanned.push(ScannedDocument {
                    entry,
                    content_hash: None,
                    read_failed: true,
                    existing,
                });
            },
        }
    }

    Ok(scanned)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{deps_with, StaticCorpus};
    use super::*;
    use corpus_sync_domain::{DocumentPath, SourceTag};

    fn tag() -> SourceTag {
        SourceTag::parse("vosdroits").expect("tag")
    }

    fn path(value: &str) -> DocumentPath {
        DocumentPath::parse(value).expect("path")
    }

    #[tokio::test]
    async fn unseen_documents_are_hashed() -> Result<()> {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document("a.xml", "<doc>a</doc>", 1_000);
        let deps = deps_with(corpus);

        let ctx = RequestContext::new_run();
        let scanned = scan_corpus(&ctx, &deps, &BTreeMap::new()).await?;

        assert_eq!(scanned.len(), 1);
        assert!(scanned[0].content_hash.is_some());
        assert!(!scanned[0].read_failed);
        Ok(())
    }

    #[tokio::test]
    async fn processed_records_with_matching_mtime_skip_hashing() -> Result<()> {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document("a.xml", "<doc>a</doc>", 1_000);
        let deps = deps_with(corpus);

        let mut record = DocumentRecord::new_pending(
            tag(),
            path("a.xml"),
            1_000,
            ContentHash::compute(b"<doc>a</doc>"),
        );
        record.mark_processed(Vec::new(), 5);
        let mut tracked = BTreeMap::new();
        tracked.insert(record.key(), record);

        let ctx = RequestContext::new_run();
        let scanned = scan_corpus(&ctx, &deps, &tracked).await?;

        assert_eq!(scanned.len(), 1);
        assert!(scanned[0].content_hash.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn failed_records_are_rehashed_despite_matching_mtime() -> Result<()> {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document("a.xml", "<doc>a</doc>", 1_000);
        let deps = deps_with(corpus);

        let mut record = DocumentRecord::new_pending(
            tag(),
            path("a.xml"),
            1_000,
            ContentHash::compute(b"<doc>a</doc>"),
        );
        record.mark_failed();
        let mut tracked = BTreeMap::new();
        tracked.insert(record.key(), record);

        let ctx = RequestContext::new_run();
        let scanned = scan_corpus(&ctx, &deps, &tracked).await?;

        assert!(scanned[0].content_hash.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_documents_are_flagged_not_fatal() -> Result<()> {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document("a.xml", "<doc>a</doc>", 1_000);
        corpus.add_unreadable("broken.xml", 1_000);
        let deps = deps_with(corpus);

        let ctx = RequestContext::new_run();
        let scanned = scan_corpus(&ctx, &deps, &BTreeMap::new()).await?;

        assert_eq!(scanned.len(), 2);
        let broken = scanned
            .iter()
            .find(|document| document.entry.path.as_str() == "broken.xml")
            .expect("broken entry");
        assert!(broken.read_failed);
        assert!(broken.content_hash.is_none());
        Ok(())
    }
}
