//! Filesystem corpus source.
//!
//! Enumerates the extracted dump directories configured per source tag and
//! reads documents on demand. Download and extraction of the dumps happen
//! upstream; this adapter only sees the resulting trees.

use crate::corpus::xml::extract_document;
use corpus_sync_domain::{DocumentPath, SourceTag};
use corpus_sync_ports::{BoxFuture, CorpusEntry, CorpusPort, DocumentText};
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const DOCUMENT_EXTENSION: &str = "xml";

/// One configured source: a tag and the directory holding its dump.
#[derive(Debug, Clone)]
pub struct FsCorpusSource {
    /// Source tag.
    pub tag: SourceTag,
    /// Directory containing the extracted dump.
    pub root_dir: PathBuf,
}

/// Filesystem-backed corpus adapter.
#[derive(Debug, Clone)]
pub struct FsCorpus {
    sources: Vec<FsCorpusSource>,
}

impl FsCorpus {
    /// Create a corpus over the given sources.
    pub fn new(sources: Vec<FsCorpusSource>) -> Result<Self> {
        if sources.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "at least one corpus source is required",
            ));
        }
        Ok(Self { sources })
    }

    fn root_for(&self, tag: &SourceTag) -> Result<&Path> {
        self.sources
            .iter()
            .find(|source| &source.tag == tag)
            .map(|source| source.root_dir.as_path())
            .ok_or_else(|| {
                ErrorEnvelope::expected(ErrorCode::not_found(), "unknown source tag")
                    .with_metadata("source_tag", tag.as_str().to_owned())
            })
    }

    async fn scan_source(
        &self,
        ctx: &RequestContext,
        source: &FsCorpusSource,
        entries: &mut Vec<CorpusEntry>,
    ) -> Result<()> {
        let mut pending = VecDeque::new();
        pending.push_back(source.root_dir.clone());

        while let Some(current) = pending.pop_front() {
            ctx.ensure_not_cancelled("corpus.list")?;

            let mut dir = tokio::fs::read_dir(&current).await.map_err(|error| {
                corpus_error(&format!("failed to read directory: {error}"))
                    .with_metadata("dir", current.to_string_lossy().to_string())
            })?;
            let mut collected = Vec::new();
            while let Some(entry) = dir.next_entry().await.map_err(ErrorEnvelope::from)? {
                collected.push(entry);
            }
            collected.sort_by_key(tokio::fs::DirEntry::file_name);

            for entry in collected {
                let path = entry.path();
                let metadata = entry.metadata().await.map_err(ErrorEnvelope::from)?;
                if metadata.is_dir() {
                    pending.push_back(path);
                    continue;
                }
                if !metadata.is_file() || !has_document_extension(&path) {
                    continue;
                }

                let Some(relative) = relative_path(&source.root_dir, &path) else {
                    continue;
                };
                let document_path = DocumentPath::parse(&relative).map_err(ErrorEnvelope::from)?;
                entries.push(CorpusEntry {
                    source_tag: source.tag.clone(),
                    path: document_path,
                    modified_at_ms: modified_at_ms(&metadata),
                    size_bytes: metadata.len(),
                });
            }
        }
        Ok(())
    }
}

impl CorpusPort for FsCorpus {
    fn list(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CorpusEntry>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut entries = Vec::new();
            for source in &self.sources {
                self.scan_source(&ctx, source, &mut entries).await?;
            }
            entries.sort_by(|left, right| {
                (&left.source_tag, &left.path).cmp(&(&right.source_tag, &right.path))
            });
            Ok(entries)
        })
    }

    fn read_bytes(
        &self,
        ctx: &RequestContext,
        source_tag: SourceTag,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<Vec<u8>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("corpus.read_bytes")?;
            let root = self.root_for(&source_tag)?;
            let absolute = root.join(path.as_str());
            tokio::fs::read(&absolute).await.map_err(|error| {
                corpus_error(&format!("failed to read document: {error}"))
                    .with_metadata("path", path.as_str().to_owned())
                    .with_metadata("source_tag", source_tag.as_str().to_owned())
            })
        })
    }

    fn read_document(
        &self,
        ctx: &RequestContext,
        source_tag: SourceTag,
        path: DocumentPath,
    ) -> BoxFuture<'_, Result<DocumentText>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let bytes = self
                .read_bytes(&ctx, source_tag.clone(), path.clone())
                .await?;
            extract_document(&bytes).map_err(|error| {
                error
                    .with_metadata("path", path.as_str().to_owned())
                    .with_metadata("source_tag", source_tag.as_str().to_owned())
            })
        })
    }
}

fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let raw = stripped.to_string_lossy().replace('\\', "/");
    if raw.is_empty() { None } else { Some(raw) }
}

fn modified_at_ms(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or(0)
}

fn corpus_error(message: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::corpus_read_failed(), message.to_owned())
}
