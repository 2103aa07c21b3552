//! Run lock boundary contract.

use corpus_sync_shared::Result;

/// Guard held for the duration of a run; released on drop.
pub trait RunLockGuard: Send {}

/// Boundary contract for the exclusive per-corpus run lock.
///
/// A second concurrent acquisition must fail fast with
/// [`corpus_sync_shared::ErrorCode::run_lock_held`] rather than block.
/// Orchestrators for different corpora coexist by using distinct lock paths.
pub trait RunLockPort: Send + Sync {
    /// Acquire the lock, or fail fast when another run holds it.
    fn acquire(&self) -> Result<Box<dyn RunLockGuard>>;
}
