//! Diff engine: classify every document against the tracking store.

use super::types::ScannedDocument;
use corpus_sync_domain::{
    ChangeKind, ContentHash, DocumentKey, DocumentRecord, DocumentStatus, PlannedDocument,
    RemovedDocument, WorkPlan,
};
use std::collections::BTreeMap;

/// Build the work plan from one scan snapshot.
///
/// The four sets are disjoint by construction: every scanned document lands
/// in exactly one of New / Modified / Unchanged, and Removed is derived from
/// tracked records absent from the scan.
pub fn build_plan(
    scanned: Vec<ScannedDocument>,
    tracked: &BTreeMap<DocumentKey, DocumentRecord>,
) -> WorkPlan {
    let mut plan = WorkPlan::default();
    let mut seen = BTreeMap::new();

    for document in scanned {
        let key = DocumentKey::new(
            document.entry.source_tag.clone(),
            document.entry.path.clone(),
        );
        seen.insert(key, ());

        match classify(&document) {
            ChangeKind::Unchanged => {
                plan.unchanged += 1;
                if let Some(record) = document.existing.as_ref() {
                    plan.unchanged_segments += record.segment_keys.len() as u64;
                }
            },
            kind => {
                let (previous_segment_keys, failure_count) = document
                    .existing
                    .as_ref()
                    .map(|record| (record.segment_keys.clone(), record.failure_count))
                    .unwrap_or_default();
                let content_hash = planned_hash(&document);
                plan.to_process.push(PlannedDocument {
                    source_tag: document.entry.source_tag,
                    path: document.entry.path,
                    kind,
                    modified_at_ms: document.entry.modified_at_ms,
                    content_hash,
                    previous_segment_keys,
                    failure_count,
                });
            },
        }
    }

    for (key, record) in tracked {
        if seen.contains_key(key) {
            continue;
        }
        plan.to_remove.push(RemovedDocument {
            source_tag: record.source_tag.clone(),
            path: record.path.clone(),
            segment_keys: record.segment_keys.clone(),
        });
    }

    plan
}

fn classify(document: &ScannedDocument) -> ChangeKind {
    let Some(record) = document.existing.as_ref() else {
        return ChangeKind::New;
    };

    if document.read_failed {
        // Force a processing attempt so the failure lands on the record.
        return ChangeKind::Modified;
    }

    match document.content_hash.as_ref() {
        // Hashing was skipped by the mtime pre-filter; only processed
        // records qualify for the skip.
        None => ChangeKind::Unchanged,
        Some(hash) => {
            if hash != &record.content_hash {
                ChangeKind::Modified
            } else if record.status == DocumentStatus::Processed {
                ChangeKind::Unchanged
            } else {
                // Identical content, but the previous run left this document
                // pending or failed: reprocess so transient failures
                // self-heal without manual intervention.
                ChangeKind::Modified
            }
        },
    }
}

fn planned_hash(document: &ScannedDocument) -> ContentHash {
    document.content_hash.clone().unwrap_or_else(|| {
        document
            .existing
            .as_ref()
            .map(|record| record.content_hash.clone())
            .unwrap_or_else(|| ContentHash::compute(&[]))
    })
}
