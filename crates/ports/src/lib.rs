//! # corpus-sync-ports
//!
//! Port traits for the corpus-sync hexagonal architecture.
//!
//! This crate defines the interfaces between the application layer and
//! infrastructure. It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
///
/// Boundary traits are I/O-bound, so the allocation per call is noise next to
/// the network or disk round trip behind it.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod corpus;
pub mod embedding;
pub mod lock;
pub mod logger;
pub mod splitter;
pub mod tracking;
pub mod vectorstore;

pub use corpus::*;
pub use embedding::*;
pub use lock::*;
pub use logger::*;
pub use splitter::*;
pub use tracking::*;
pub use vectorstore::*;

// Re-export the domain types used in port signatures, so adapter crates can
// implement ports without directly depending on `corpus-sync-domain`.
pub use corpus_sync_domain::{
    ContentHash, DocumentKey, DocumentPath, DocumentRecord, DocumentStatus, SegmentKey, SourceTag,
    TrackingCounts,
};
