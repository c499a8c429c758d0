//! Issue editing operations and the schedule view.
//!
//! Every edit loads the issue from the index, changes one top-level field and
//! persists only that field, so sibling files keep their bytes.

use crate::error::ApiError;
use crate::model::issue::{ANNEXES, MessageBlock};
use crate::model::{AnnexedPosition, Dataset, Issue, Message};
use crate::store::DocumentStore;
use crate::types::{DatasetId, IssueId, PublicationId};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

pub struct IssueEditor {
    store: Arc<DocumentStore>,
    /// Serializes read-modify-write cycles on issues.
    edit_gate: AsyncMutex<()>,
}

impl IssueEditor {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            edit_gate: AsyncMutex::new(()),
        }
    }

    async fn load(&self, id: IssueId) -> Result<Issue, ApiError> {
        self.store
            .issues
            .get(&id)
            .await?
            .ok_or(ApiError::IssueNotFound(id))
    }

    /// Create an issue skeleton: no messages, no annexes.
    pub async fn schedule_issue(
        &self,
        id: IssueId,
        publication_date: NaiveDate,
        cutoff_date: NaiveDate,
    ) -> Result<Issue, ApiError> {
        let _gate = self.edit_gate.lock().await;
        if self.store.issues.get(&id).await?.is_some() {
            return Err(ApiError::IssueExists(id));
        }
        let issue = Issue::scheduled(id, publication_date, cutoff_date);
        self.store.issues.store(&issue).await?;
        info!(issue = %id, publication_date = %publication_date, "Issue scheduled");
        Ok(issue)
    }

    /// Insert `message` at `index` (clamped), or append. Returns the final position.
    pub async fn add_message(
        &self,
        id: IssueId,
        block: MessageBlock,
        message: Message,
        index: Option<usize>,
    ) -> Result<usize, ApiError> {
        let _gate = self.edit_gate.lock().await;
        let mut issue = self.load(id).await?;
        let messages = issue.messages_mut(block);
        let position = index.map_or(messages.len(), |i| i.min(messages.len()));
        messages.insert(position, message);
        self.store.issues.store_fields(&issue, &[block.field()]).await?;
        debug!(issue = %id, block = ?block, position, "Message added");
        Ok(position)
    }

    pub async fn edit_message(
        &self,
        id: IssueId,
        block: MessageBlock,
        index: usize,
        message: Message,
    ) -> Result<(), ApiError> {
        let _gate = self.edit_gate.lock().await;
        let mut issue = self.load(id).await?;
        let slot = issue
            .messages_mut(block)
            .get_mut(index)
            .ok_or(ApiError::MessageNotFound { issue: id, index })?;
        *slot = message;
        self.store.issues.store_fields(&issue, &[block.field()]).await?;
        Ok(())
    }

    /// Remove and return the message at `index`.
    pub async fn delete_message(
        &self,
        id: IssueId,
        block: MessageBlock,
        index: usize,
    ) -> Result<Message, ApiError> {
        let _gate = self.edit_gate.lock().await;
        let mut issue = self.load(id).await?;
        let messages = issue.messages_mut(block);
        if index >= messages.len() {
            return Err(ApiError::MessageNotFound { issue: id, index });
        }
        let removed = messages.remove(index);
        self.store.issues.store_fields(&issue, &[block.field()]).await?;
        Ok(removed)
    }

    /// Annex `publication` at this issue, keeping any datasets already attached.
    pub async fn set_annex_position(
        &self,
        id: IssueId,
        publication: PublicationId,
        position_date: Option<NaiveDate>,
    ) -> Result<(), ApiError> {
        let _gate = self.edit_gate.lock().await;
        let mut issue = self.load(id).await?;
        let entry = issue.annexes.entry(publication.clone()).or_insert(None);
        let mut position = entry.take().unwrap_or_default();
        position.position_date = position_date;
        *entry = Some(position);
        self.store.issues.store_fields(&issue, &[ANNEXES]).await?;
        info!(issue = %id, publication = %publication, "Annex position set");
        Ok(())
    }

    /// Null out the annex entry. The key remains so the file merge carries it.
    pub async fn clear_annex(&self, id: IssueId, publication: &PublicationId) -> Result<(), ApiError> {
        let _gate = self.edit_gate.lock().await;
        let mut issue = self.load(id).await?;
        match issue.annexes.get_mut(publication) {
            Some(entry) => *entry = None,
            None => {
                return Err(ApiError::AnnexNotFound {
                    issue: id,
                    publication: publication.to_string(),
                })
            }
        }
        self.store.issues.store_fields(&issue, &[ANNEXES]).await?;
        info!(issue = %id, publication = %publication, "Annex cleared");
        Ok(())
    }

    /// Attach a dataset snapshot to an annexed position, creating the position if needed.
    pub async fn attach_dataset(
        &self,
        id: IssueId,
        publication: PublicationId,
        dataset_id: DatasetId,
        dataset: Dataset,
    ) -> Result<(), ApiError> {
        let _gate = self.edit_gate.lock().await;
        let mut issue = self.load(id).await?;
        let entry = issue.annexes.entry(publication).or_insert(None);
        let position = entry.get_or_insert_with(AnnexedPosition::default);
        position
            .datasets
            .get_or_insert_with(Default::default)
            .insert(dataset_id.clone(), dataset);
        self.store.issues.store_fields(&issue, &[ANNEXES]).await?;
        debug!(issue = %id, dataset = %dataset_id, "Dataset attached");
        Ok(())
    }
}

/// One row of the schedule overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: IssueId,
    pub publication_date: NaiveDate,
    pub cutoff_date: NaiveDate,
    pub general_messages: usize,
    pub amendment_messages: usize,
    pub annexes: usize,
}

impl From<&Issue> for ScheduleEntry {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id,
            publication_date: issue.publication_date,
            cutoff_date: issue.cutoff_date,
            general_messages: issue.general_messages.len(),
            amendment_messages: issue.amendment_messages.len(),
            annexes: issue.annexes.values().filter(|p| p.is_some()).count(),
        }
    }
}

/// Issues in ID order, rebuilt when the store generation moves.
pub struct ScheduleView {
    store: Arc<DocumentStore>,
    cached: RwLock<Option<(u64, Arc<Vec<ScheduleEntry>>)>>,
}

impl ScheduleView {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    pub async fn entries(&self) -> Result<Arc<Vec<ScheduleEntry>>, ApiError> {
        let generation = self.store.generation();
        let hit = self
            .cached
            .read()
            .as_ref()
            .filter(|(seen, _)| *seen == generation)
            .map(|(_, rows)| rows.clone());
        if let Some(rows) = hit {
            return Ok(rows);
        }
        let index = self.store.issues.index().await?;
        let rows = Arc::new(index.values().map(ScheduleEntry::from).collect::<Vec<_>>());
        *self.cached.write() = Some((generation, rows.clone()));
        Ok(rows)
    }
}
