//! Per-document processing: read, extract, split, embed.
//!
//! This stage never touches the tracking store or the vector store; its only
//! output is the embedded segments handed to the synchronization lane.

use super::types::{ProcessedDocument, SyncRunDeps, SyncRunInput};
use corpus_sync_domain::{PlannedDocument, SegmentKey};
use corpus_sync_ports::{
    CorpusPort, EmbedBatchRequest, EmbeddingPort, SegmentForUpsert, SegmentMetadata, SplitterPort,
    TextChunk,
};
use corpus_sync_shared::{retry_async, RequestContext, Result};

/// Process one planned document through chunking and embedding.
///
/// Transient embedding failures are retried with bounded backoff; permanent
/// failures (and exhausted retries) surface as errors, failing this document
/// only.
pub async fn process_document(
    ctx: &RequestContext,
    deps: &SyncRunDeps,
    input: &SyncRunInput,
    planned: PlannedDocument,
) -> Result<ProcessedDocument> {
    ctx.ensure_not_cancelled("sync_run.process")?;

    let document = deps
        .corpus
        .read_document(ctx, planned.source_tag.clone(), planned.path.clone())
        .await?;

    let chunks = deps.splitter.split(document.text.as_ref())?;
    let total_chunks = u32::try_from(chunks.len()).unwrap_or(u32::MAX);

    let mut segments = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(input.embedding_batch_size.get()) {
        ctx.ensure_not_cancelled("sync_run.embed")?;

        let texts: Vec<Box<str>> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = retry_async(ctx, input.retry, "sync_run.embed", || {
            deps.embedding
                .embed_batch(ctx, EmbedBatchRequest::from(texts.clone()))
        })
        .await?;

        for (chunk, vector) in batch.iter().zip(vectors) {
            segments.push(build_segment(
                &planned,
                chunk,
                total_chunks,
                vector.into_vector(),
                &document.attributes,
            ));
        }
    }

    Ok(ProcessedDocument { planned, segments })
}

fn build_segment(
    planned: &PlannedDocument,
    chunk: &TextChunk,
    total_chunks: u32,
    vector: std::sync::Arc<[f32]>,
    attributes: &std::collections::BTreeMap<Box<str>, serde_json::Value>,
) -> SegmentForUpsert {
    SegmentForUpsert {
        key: SegmentKey::derive(&planned.source_tag, &planned.path, chunk.index),
        vector,
        content: chunk.content.clone(),
        metadata: SegmentMetadata {
            source_tag: planned.source_tag.clone(),
            path: planned.path.clone(),
            chunk_index: chunk.index,
            total_chunks,
            attributes: attributes.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{
        deps_with_embedding, CountingEmbedding, FlakyEmbedding, StaticCorpus,
    };
    use super::*;
    use corpus_sync_domain::{ChangeKind, ContentHash, DocumentPath, SourceTag};
    use corpus_sync_shared::RetryPolicy;
    use std::num::NonZeroUsize;

    fn tag() -> SourceTag {
        SourceTag::parse("vosdroits").expect("tag")
    }

    fn input() -> SyncRunInput {
        SyncRunInput {
            max_workers: NonZeroUsize::new(2).expect("workers"),
            queue_capacity: None,
            embedding_batch_size: NonZeroUsize::new(2).expect("batch"),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
                jitter_ratio_pct: 0,
            },
        }
    }

    fn planned(path: &str) -> PlannedDocument {
        PlannedDocument {
            source_tag: tag(),
            path: DocumentPath::parse(path).expect("path"),
            kind: ChangeKind::New,
            modified_at_ms: 1_000,
            content_hash: ContentHash::compute(b"irrelevant"),
            previous_segment_keys: Vec::new(),
            failure_count: 0,
        }
    }

    #[tokio::test]
    async fn segments_carry_chunk_identity_and_attributes() -> Result<()> {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document(
            "a.xml",
            r#"<doc spUrl="https://example.org/a">alpha beta</doc>"#,
            1_000,
        );
        let deps = deps_with_embedding(corpus, CountingEmbedding::reliable());

        let ctx = RequestContext::new_run();
        let processed = process_document(&ctx, &deps, &input(), planned("a.xml")).await?;

        assert_eq!(processed.segments.len(), 1);
        let segment = &processed.segments[0];
        assert_eq!(segment.metadata.chunk_index, 0);
        assert_eq!(segment.metadata.total_chunks, 1);
        assert_eq!(
            segment.key,
            SegmentKey::derive(&tag(), &processed.planned.path, 0)
        );
        assert_eq!(
            segment.metadata.attributes.get("spUrl").cloned(),
            Some(serde_json::Value::String("https://example.org/a".into()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_documents_produce_no_segments() -> Result<()> {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document("empty.xml", "<doc><meta/></doc>", 1_000);
        let deps = deps_with_embedding(corpus, CountingEmbedding::reliable());

        let ctx = RequestContext::new_run();
        let processed = process_document(&ctx, &deps, &input(), planned("empty.xml")).await?;
        assert!(processed.segments.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn transient_embedding_failures_are_retried() -> Result<()> {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document("a.xml", "<doc>alpha</doc>", 1_000);
        let embedding = FlakyEmbedding::rate_limited_times(2);
        let deps = deps_with_embedding(corpus, embedding.clone());

        let ctx = RequestContext::new_run();
        let processed = process_document(&ctx, &deps, &input(), planned("a.xml")).await?;

        assert_eq!(processed.segments.len(), 1);
        assert_eq!(embedding.calls(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn permanent_embedding_failures_abort_the_document() {
        let corpus = StaticCorpus::new(tag());
        corpus.add_document("a.xml", "<doc>alpha</doc>", 1_000);
        let embedding = FlakyEmbedding::always_permanent();
        let deps = deps_with_embedding(corpus, embedding.clone());

        let ctx = RequestContext::new_run();
        let result = process_document(&ctx, &deps, &input(), planned("a.xml")).await;

        assert!(result.is_err());
        assert_eq!(embedding.calls(), 1);
    }

    #[tokio::test]
    async fn unreadable_documents_fail_with_corpus_code() {
        let corpus = StaticCorpus::new(tag());
        corpus.add_unreadable("broken.xml", 1_000);
        let deps = deps_with_embedding(corpus, CountingEmbedding::reliable());

        let ctx = RequestContext::new_run();
        let result = process_document(&ctx, &deps, &input(), planned("broken.xml")).await;

        let error = match result {
            Err(error) => error,
            Ok(_) => panic!("expected a corpus failure"),
        };
        assert_eq!(
            error.code,
            corpus_sync_shared::ErrorCode::corpus_read_failed()
        );
    }
}
