//! Per-collection in-memory index with merge-on-write persistence.

use crate::error::StorageError;
use crate::store::events::{ChangeKind, IndexChanged};
use crate::store::persistence::{self, load_object, merge_write, WriteOutcome};
use crate::store::{Document, StoreContext, META_FILE};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Immutable snapshot of a collection. Swapped in whole, never mutated in place.
pub type Index<T> = Arc<BTreeMap<<T as Document>::Id, T>>;

const LOAD_CONCURRENCY: usize = 16;

/// An object directory that could not be loaded.
#[derive(Debug, Clone)]
pub struct SkippedObject {
    pub dir: PathBuf,
    pub reason: String,
}

/// Summary of the last full scan.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedObject>,
}

pub struct Collection<T: Document> {
    ctx: Arc<StoreContext>,
    snapshot: RwLock<Option<Index<T>>>,
    last_report: RwLock<LoadReport>,
    /// Serializes index builds so concurrent first readers share one scan.
    load_gate: AsyncMutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Collection<T> {
    pub(crate) fn new(ctx: Arc<StoreContext>) -> Self {
        Self {
            ctx,
            snapshot: RwLock::new(None),
            last_report: RwLock::new(LoadReport::default()),
            load_gate: AsyncMutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        T::COLLECTION
    }

    /// Root directory of this collection.
    pub fn root(&self) -> PathBuf {
        self.ctx.root.join(T::COLLECTION)
    }

    fn object_dir(&self, id: &T::Id) -> PathBuf {
        self.root().join(id.to_string())
    }

    /// Cached snapshot, if the collection has been loaded. Never waits.
    pub fn cached(&self) -> Option<Index<T>> {
        self.snapshot.read().clone()
    }

    /// Lazily loaded index. The first call scans the collection directory.
    pub async fn index(&self) -> Result<Index<T>, StorageError> {
        if let Some(index) = self.cached() {
            return Ok(index);
        }
        let _gate = self.load_gate.lock().await;
        if let Some(index) = self.cached() {
            return Ok(index);
        }
        self.rebuild().await
    }

    /// Discard the cache and rebuild the index from disk.
    ///
    /// Waits for in-flight mutations on the working tree so the new snapshot
    /// never misses a write that completed before the scan started.
    pub async fn reload(&self) -> Result<Index<T>, StorageError> {
        let _gate = self.load_gate.lock().await;
        let _tree = self.ctx.locks.acquire(&self.ctx.root).await;
        self.rebuild().await
    }

    async fn rebuild(&self) -> Result<Index<T>, StorageError> {
        let (docs, report) = self.scan().await?;
        info!(
            collection = T::COLLECTION,
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "Collection index built"
        );
        let index: Index<T> = Arc::new(docs);
        *self.snapshot.write() = Some(index.clone());
        *self.last_report.write() = report;

        let generation = self.ctx.bump(!T::HISTORY_FIELDS.is_empty());
        self.ctx.bus.emit(IndexChanged {
            collection: T::COLLECTION,
            id: None,
            kind: ChangeKind::Reloaded,
            fields: Vec::new(),
            generation,
        });
        Ok(index)
    }

    async fn scan(&self) -> Result<(BTreeMap<T::Id, T>, LoadReport), StorageError> {
        let root = self.root();
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(collection = T::COLLECTION, "Collection root absent; index is empty");
                return Ok((BTreeMap::new(), LoadReport::default()));
            }
            Err(e) => return Err(StorageError::fs(&root, e)),
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::fs(&root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match T::parse_id(&name) {
                Some(id) => candidates.push((id, entry.path())),
                None => debug!(collection = T::COLLECTION, entry = %name, "Ignoring non-object directory"),
            }
        }

        let results: Vec<_> = stream::iter(candidates)
            .map(|(id, dir)| async move {
                let loaded = load_object::<T>(&dir, &id).await;
                (id, dir, loaded)
            })
            .buffer_unordered(LOAD_CONCURRENCY)
            .collect()
            .await;

        let mut docs = BTreeMap::new();
        let mut report = LoadReport::default();
        for (id, dir, loaded) in results {
            match loaded {
                Ok(doc) => {
                    docs.insert(id, doc);
                    report.loaded += 1;
                }
                Err(e) => {
                    warn!(collection = T::COLLECTION, dir = %dir.display(), error = %e, "Skipping object");
                    report.skipped.push(SkippedObject {
                        dir,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok((docs, report))
    }

    pub fn last_report(&self) -> LoadReport {
        self.last_report.read().clone()
    }

    pub async fn get(&self, id: &T::Id) -> Result<Option<T>, StorageError> {
        Ok(self.index().await?.get(id).cloned())
    }

    /// Persist every field of `doc`: meta plus one merge-write per structured field.
    pub async fn store(&self, doc: &T) -> Result<(), StorageError> {
        let (meta, structured) = persistence::split_document(doc)?;
        let mut fields: Vec<String> = meta.keys().cloned().collect();
        fields.extend(structured.iter().map(|(f, _)| f.field.to_string()));

        self.index().await?;
        let _tree = self.ctx.locks.acquire(&self.ctx.root).await;
        let dir = self.object_dir(&doc.id());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::fs(&dir, e))?;

        merge_write(&dir.join(META_FILE), Value::Object(meta)).await?;
        for (field, value) in structured {
            merge_write(&dir.join(field.file), value).await?;
        }

        let merged = load_object::<T>(&dir, &doc.id()).await?;
        self.commit_to_index(merged, fields).await
    }

    /// Persist only the named top-level fields of `doc`; every other file stays as it is.
    ///
    /// The object must already exist in the index, since a partial write cannot
    /// create the primary file.
    pub async fn store_fields(&self, doc: &T, fields: &[&str]) -> Result<(), StorageError> {
        let id = doc.id();
        if self.index().await?.get(&id).is_none() {
            return Err(StorageError::NotFound {
                collection: T::COLLECTION.to_string(),
                id: id.to_string(),
            });
        }

        let (meta, structured) = persistence::split_document(doc)?;
        let mut meta_patch = Map::new();
        let mut field_writes = Vec::new();
        for &name in fields {
            if let Some((file, value)) = structured.iter().find(|(f, _)| f.field == name) {
                field_writes.push((file.file, value.clone()));
            } else if let Some(value) = meta.get(name) {
                meta_patch.insert(name.to_string(), value.clone());
            } else {
                return Err(StorageError::UnknownField {
                    collection: T::COLLECTION.to_string(),
                    field: name.to_string(),
                });
            }
        }

        let _tree = self.ctx.locks.acquire(&self.ctx.root).await;
        let dir = self.object_dir(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::fs(&dir, e))?;

        if !meta_patch.is_empty() {
            merge_write(&dir.join(META_FILE), Value::Object(meta_patch)).await?;
        }
        let mut written = 0usize;
        for (file, value) in field_writes {
            if merge_write(&dir.join(file), value).await? == WriteOutcome::Written {
                written += 1;
            }
        }
        debug!(collection = T::COLLECTION, id = %id, fields = ?fields, written, "Stored fields");

        let merged = load_object::<T>(&dir, &id).await?;
        self.commit_to_index(merged, fields.iter().map(|f| f.to_string()).collect())
            .await
    }

    /// Install `doc` as read back from disk, so keys kept by the merge are indexed too.
    async fn commit_to_index(&self, doc: T, fields: Vec<String>) -> Result<(), StorageError> {
        let id = doc.id();
        // Writes before the first load still need a full index to update.
        let current = match self.cached() {
            Some(index) => index,
            None => self.rebuild().await?,
        };
        let mut next = (*current).clone();
        next.insert(id.clone(), doc);
        *self.snapshot.write() = Some(Arc::new(next));

        let touches_history = fields
            .iter()
            .any(|f| T::HISTORY_FIELDS.contains(&f.as_str()));
        let generation = self.ctx.bump(touches_history);
        self.ctx.bus.emit(IndexChanged {
            collection: T::COLLECTION,
            id: Some(id.to_string()),
            kind: ChangeKind::Stored,
            fields,
            generation,
        });
        Ok(())
    }

    /// Remove the in-memory entry. Files on disk are left for the caller to handle.
    pub async fn delete(&self, id: &T::Id) -> Result<bool, StorageError> {
        let _tree = self.ctx.locks.acquire(&self.ctx.root).await;
        let current = match self.cached() {
            Some(index) => index,
            None => return Ok(false),
        };
        if !current.contains_key(id) {
            return Ok(false);
        }
        let mut next = (*current).clone();
        next.remove(id);
        *self.snapshot.write() = Some(Arc::new(next));

        let generation = self.ctx.bump(!T::HISTORY_FIELDS.is_empty());
        self.ctx.bus.emit(IndexChanged {
            collection: T::COLLECTION,
            id: Some(id.to_string()),
            kind: ChangeKind::Deleted,
            fields: Vec::new(),
            generation,
        });
        Ok(true)
    }

    /// Remove the object's directory from the working tree.
    pub async fn remove_from_disk(&self, id: &T::Id) -> Result<(), StorageError> {
        let _tree = self.ctx.locks.acquire(&self.ctx.root).await;
        let dir = self.object_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::fs(&dir, e)),
        }
    }

    /// Path of the primary file for `id`.
    pub fn meta_path(&self, id: &T::Id) -> PathBuf {
        self.object_dir(id).join(META_FILE)
    }

    /// Path of a structured field file for `id`.
    pub fn field_path(&self, id: &T::Id, field: &str) -> Option<PathBuf> {
        T::STRUCTURED_FIELDS
            .iter()
            .find(|f| f.field == field)
            .map(|f| self.object_dir(id).join(f.file))
    }
}
