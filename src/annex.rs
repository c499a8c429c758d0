//! Running Annex Resolver
//!
//! Reconstructs which publications are currently annexed as of just before a
//! target issue. The scan walks past issues from the nearest backwards; the
//! first time a publication is seen, that entry wins.

use crate::error::StorageError;
use crate::model::{Issue, RunningAnnex};
use crate::store::DocumentStore;
use crate::types::{IssueId, PublicationId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Resolve the running annexes visible before `target`.
///
/// Output is in discovery order (nearest issue first, then the issue's own
/// annex order). With `publication` set, the result has at most one entry.
pub fn running_annexes(
    issues: &BTreeMap<IssueId, Issue>,
    target: IssueId,
    publication: Option<&PublicationId>,
) -> Vec<RunningAnnex> {
    let mut resolved: HashSet<&PublicationId> = HashSet::new();
    let mut out = Vec::new();

    for (issue_id, issue) in issues.range(..target).rev() {
        for (publication_id, position) in &issue.annexes {
            if let Some(wanted) = publication {
                if publication_id != wanted {
                    continue;
                }
            }
            if !resolved.insert(publication_id) {
                continue;
            }
            out.push(RunningAnnex {
                publication_id: publication_id.clone(),
                issue_id: *issue_id,
                position_date: position.as_ref().and_then(|p| p.position_date),
            });
            if publication.is_some() {
                return out;
            }
        }
    }
    out
}

/// Most recent annex of `publication` strictly before `target`.
pub fn latest_annex(
    issues: &BTreeMap<IssueId, Issue>,
    target: IssueId,
    publication: &PublicationId,
) -> Option<RunningAnnex> {
    running_annexes(issues, target, Some(publication)).into_iter().next()
}

type MemoKey = (IssueId, Option<PublicationId>);

/// Memo of resolver results, valid for one annex generation of the store.
#[derive(Default)]
pub struct RunningAnnexCache {
    inner: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<MemoKey, Arc<Vec<RunningAnnex>>>,
}

impl RunningAnnexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        generation: u64,
        target: IssueId,
        publication: Option<&PublicationId>,
    ) -> Option<Arc<Vec<RunningAnnex>>> {
        let state = self.inner.lock();
        if state.generation != generation {
            return None;
        }
        state.entries.get(&(target, publication.cloned())).cloned()
    }

    pub fn insert(
        &self,
        generation: u64,
        target: IssueId,
        publication: Option<&PublicationId>,
        value: Arc<Vec<RunningAnnex>>,
    ) {
        let mut state = self.inner.lock();
        if state.generation != generation {
            state.entries.clear();
            state.generation = generation;
        }
        state.entries.insert((target, publication.cloned()), value);
    }

    pub fn invalidate(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a history scan may use the cached index or must reload it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    #[default]
    Cached,
    ForceReload,
}

/// Store-backed resolver with memoization.
pub struct AnnexResolver {
    store: Arc<DocumentStore>,
    cache: RunningAnnexCache,
}

impl AnnexResolver {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            cache: RunningAnnexCache::new(),
        }
    }

    pub fn cache(&self) -> &RunningAnnexCache {
        &self.cache
    }

    pub async fn resolve(
        &self,
        target: IssueId,
        publication: Option<&PublicationId>,
        freshness: Freshness,
    ) -> Result<Arc<Vec<RunningAnnex>>, StorageError> {
        if freshness == Freshness::ForceReload {
            self.store.issues.reload().await?;
        }
        // Read the generation before the snapshot: a concurrent write can only
        // make the cached entry stale-keyed, never stale-valued.
        let generation = self.store.annex_generation();
        if let Some(hit) = self.cache.get(generation, target, publication) {
            trace!(target = %target, "Running annex memo hit");
            return Ok(hit);
        }
        let index = self.store.issues.index().await?;

        let result = Arc::new(running_annexes(&index, target, publication));
        self.cache.insert(generation, target, publication, result.clone());
        Ok(result)
    }

    pub async fn latest(
        &self,
        target: IssueId,
        publication: &PublicationId,
        freshness: Freshness,
    ) -> Result<Option<RunningAnnex>, StorageError> {
        Ok(self
            .resolve(target, Some(publication), freshness)
            .await?
            .first()
            .cloned())
    }
}
