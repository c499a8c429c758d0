//! Working-tree lock management
//!
//! Store writes and sync operations touch the same files on disk, so at most one
//! mutating operation may run against a given repository root at a time. Locks
//! are keyed by the canonical root path; two handles opened on the same
//! directory through different spellings share one lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Guard held for the duration of one mutating operation.
pub type WorkingTreeGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct WorkingTreeLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl WorkingTreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical key for a root.
    ///
    /// A root that does not exist yet is keyed by its nearest existing
    /// ancestor, canonicalized, plus the remaining components, so the key does
    /// not change once the directory is created.
    pub fn key_for(root: &Path) -> PathBuf {
        let mut existing = root;
        let mut missing = Vec::new();
        loop {
            if let Ok(canonical) = dunce::canonicalize(existing) {
                return missing
                    .iter()
                    .rev()
                    .fold(canonical, |path, part| path.join(part));
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return root.to_path_buf(),
            }
        }
    }

    fn lock_for(&self, root: &Path) -> Arc<AsyncMutex<()>> {
        let key = Self::key_for(root);
        let mut locks = self.locks.lock();
        locks
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait until no other mutation is in flight on `root`.
    pub async fn acquire(&self, root: &Path) -> WorkingTreeGuard {
        let lock = self.lock_for(root);
        trace!(root = %root.display(), "acquiring working-tree lock");
        lock.lock_owned().await
    }

    /// Acquire without waiting; `None` if another mutation holds the lock.
    pub fn try_acquire(&self, root: &Path) -> Option<WorkingTreeGuard> {
        self.lock_for(root).try_lock_owned().ok()
    }
}
