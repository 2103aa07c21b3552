//! # corpus-sync-domain
//!
//! Domain entities, primitives, and value objects for the corpus-sync
//! workspace: validated identifiers, the per-document tracking record, the
//! change classification produced by the diff engine, and the run summary.

pub mod plan;
pub mod primitives;
pub mod record;
pub mod summary;

pub use plan::{ChangeKind, PlannedDocument, RemovedDocument, WorkPlan};
pub use primitives::{ContentHash, DocumentKey, DocumentPath, PrimitiveError, SegmentKey, SourceTag};
pub use record::{DocumentRecord, DocumentStatus};
pub use summary::{RunSummary, TrackingCounts};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
