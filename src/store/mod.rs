//! Versioned Document Store
//!
//! Persists typed objects as per-object directories of JSON files inside the
//! repository working tree and keeps one in-memory index per collection. All
//! queries go through the index; writes go through the files first and then
//! update the index entry.

pub mod collection;
pub mod events;
pub mod persistence;

pub use collection::{Collection, Index, LoadReport, SkippedObject};
pub use events::{ChangeBus, ChangeKind, IndexChanged};
pub use persistence::WriteOutcome;

use crate::concurrency::WorkingTreeLocks;
use crate::model::{Issue, Publication};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Primary file holding scalar top-level fields.
pub const META_FILE: &str = "meta.json";

/// A structured top-level field persisted in its own sibling file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFile {
    pub field: &'static str,
    pub file: &'static str,
}

impl FieldFile {
    pub const fn new(field: &'static str, file: &'static str) -> Self {
        Self { field, file }
    }
}

/// A typed object that the store can persist and index.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Id: Ord + Clone + Display + Debug + FromStr + Send + Sync + 'static;

    /// Directory name of the collection under the store root.
    const COLLECTION: &'static str;

    /// Fields stored outside `meta.json`, one file each.
    const STRUCTURED_FIELDS: &'static [FieldFile];

    /// Fields whose changes invalidate history-derived caches.
    const HISTORY_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> Self::Id;

    /// Map an object directory name to an ID. `None` skips the directory.
    fn parse_id(dir_name: &str) -> Option<Self::Id> {
        dir_name.parse().ok()
    }

    /// Normalize legacy or malformed shapes before deserialization.
    fn post_load(_id: &Self::Id, _raw: &mut Map<String, Value>) {}
}

/// Shared state of one store root.
pub(crate) struct StoreContext {
    pub(crate) root: PathBuf,
    pub(crate) locks: Arc<WorkingTreeLocks>,
    pub(crate) bus: ChangeBus,
    generation: AtomicU64,
    history_generation: AtomicU64,
}

impl StoreContext {
    /// Advance the store generation, and the history generation if `history` is set.
    pub(crate) fn bump(&self, history: bool) -> u64 {
        if history {
            self.history_generation.fetch_add(1, Ordering::SeqCst);
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// The document store: one index per collection plus generation counters.
pub struct DocumentStore {
    ctx: Arc<StoreContext>,
    pub issues: Collection<Issue>,
    pub publications: Collection<Publication>,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>, locks: Arc<WorkingTreeLocks>) -> Self {
        let ctx = Arc::new(StoreContext {
            root: root.into(),
            locks,
            bus: ChangeBus::new(),
            generation: AtomicU64::new(0),
            history_generation: AtomicU64::new(0),
        });
        Self {
            issues: Collection::new(ctx.clone()),
            publications: Collection::new(ctx.clone()),
            ctx,
        }
    }

    pub fn root(&self) -> &Path {
        &self.ctx.root
    }

    /// Monotonic counter advanced by every write, delete and reload.
    pub fn generation(&self) -> u64 {
        self.ctx.generation.load(Ordering::SeqCst)
    }

    /// Counter advanced whenever an issue's annexes may have changed.
    pub fn annex_generation(&self) -> u64 {
        self.ctx.history_generation.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexChanged> {
        self.ctx.bus.subscribe()
    }

    /// Names of the collections this store manages.
    pub fn collection_names(&self) -> [&'static str; 2] {
        [Issue::COLLECTION, Publication::COLLECTION]
    }

    /// Force a full rebuild of every collection index.
    pub async fn reload_all(&self) -> Result<(), crate::error::StorageError> {
        self.issues.reload().await?;
        self.publications.reload().await?;
        Ok(())
    }
}
