//! File-based run lock.
//!
//! Advisory exclusive lock on a well-known file. Acquisition fails fast when
//! another process (or another orchestrator in this process) holds the lock;
//! dropping the guard releases it, including on panic and on error paths.

use corpus_sync_ports::{RunLockGuard, RunLockPort};
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

/// Run lock backed by an advisory file lock.
#[derive(Debug, Clone)]
pub struct FileRunLock {
    path: PathBuf,
}

impl FileRunLock {
    /// Create a lock over the given file path.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RunLockPort for FileRunLock {
    fn acquire(&self) -> Result<Box<dyn RunLockGuard>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(ErrorEnvelope::from)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|error| {
                ErrorEnvelope::from(error)
                    .with_metadata("path", self.path.to_string_lossy().to_string())
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Box::new(FileGuard { file })),
            Err(_) => Err(ErrorEnvelope::expected(
                ErrorCode::run_lock_held(),
                "another run is already in progress",
            )
            .with_metadata("path", self.path.to_string_lossy().to_string())),
        }
    }
}

struct FileGuard {
    file: File,
}

impl RunLockGuard for FileGuard {}

impl Drop for FileGuard {
    fn drop(&mut self) {
        // Best effort; closing the descriptor releases the lock anyway.
        let _ = FileExt::unlock(&self.file);
    }
}
