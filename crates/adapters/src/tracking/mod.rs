//! Tracking store adapters.

mod sqlite;

pub use sqlite::SqliteTrackingStore;
