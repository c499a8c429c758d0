//! Amendment Dataset Patcher
//!
//! Combines the running annex of a publication with the amendments filed
//! after it to produce the change list for each annexed dataset, and applies
//! such change lists onto the annexed snapshot.

use crate::annex::{latest_annex, AnnexResolver, Freshness};
use crate::error::{AmendmentError, ApiError};
use crate::model::{Dataset, DatasetChange, DatasetContents, Issue, RunningAnnex};
use crate::store::DocumentStore;
use crate::types::{DatasetId, IssueId, PublicationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

/// Result of a patch query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "datasets", rename_all = "camelCase")]
pub enum DatasetPatch {
    /// No prior annex, or the annex carries no snapshot for the dataset.
    NoData,
    /// Change list per dataset. Empty lists mean no intervening amendments.
    Changes(BTreeMap<DatasetId, DatasetChange>),
}

impl DatasetPatch {
    pub fn changes(&self) -> Option<&BTreeMap<DatasetId, DatasetChange>> {
        match self {
            DatasetPatch::NoData => None,
            DatasetPatch::Changes(changes) => Some(changes),
        }
    }
}

/// Change list for `publication` as of `target`, optionally restricted to one dataset.
pub fn dataset_changes(
    issues: &BTreeMap<IssueId, Issue>,
    publication: &PublicationId,
    target: IssueId,
    dataset: Option<&DatasetId>,
) -> DatasetPatch {
    match latest_annex(issues, target, publication) {
        Some(annex) => collect_changes(issues, &annex, target, dataset),
        None => DatasetPatch::NoData,
    }
}

/// Concatenate amendment change lists filed strictly between the annex and `target`.
pub fn collect_changes(
    issues: &BTreeMap<IssueId, Issue>,
    annex: &RunningAnnex,
    target: IssueId,
    dataset: Option<&DatasetId>,
) -> DatasetPatch {
    let snapshot = issues
        .get(&annex.issue_id)
        .and_then(|issue| issue.annexes.get(&annex.publication_id))
        .and_then(|position| position.as_ref())
        .and_then(|position| position.datasets.as_ref());
    let Some(snapshot) = snapshot else {
        return DatasetPatch::NoData;
    };

    let dataset_ids: Vec<&DatasetId> = match dataset {
        Some(wanted) if snapshot.contains_key(wanted) => vec![wanted],
        Some(_) => return DatasetPatch::NoData,
        None => snapshot.keys().collect(),
    };

    let mut changes: BTreeMap<DatasetId, DatasetChange> = dataset_ids
        .iter()
        .map(|id| ((*id).clone(), DatasetChange::default()))
        .collect();

    if annex.issue_id >= target {
        return DatasetPatch::Changes(changes);
    }
    let window = (Bound::Excluded(annex.issue_id), Bound::Excluded(target));
    for (issue_id, issue) in issues.range(window) {
        for amendment in issue.amendments_targeting(&annex.publication_id) {
            for id in &dataset_ids {
                if let Some(change) = amendment.changes_for(id) {
                    debug!(issue = %issue_id, dataset = %id, entries = change.contents.len(), "Collecting amendment changes");
                    if let Some(entry) = changes.get_mut(*id) {
                        entry.contents.extend(change.contents.iter().cloned());
                    }
                }
            }
        }
    }
    DatasetPatch::Changes(changes)
}

/// One entry of a dataset change list.
///
/// Map datasets address records by `key`. List datasets address records by
/// `key` when the schema declares a key field, otherwise by `index`; a keyed
/// update or delete against a list without a key field is malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RecordChange {
    /// Put a whole record, replacing any record with the same key.
    Insert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        record: Value,
    },
    /// Shallow-merge fields over an existing record; inserts when the key is new.
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        record: Value,
    },
    /// Remove a record. Removing an absent record is a no-op.
    Delete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
}

fn merge_record(existing: &mut Value, update: Value) {
    match (existing, update) {
        (Value::Object(base), Value::Object(fields)) => {
            for (k, v) in fields {
                base.insert(k, v);
            }
        }
        (slot, update) => *slot = update,
    }
}

fn key_of(record: &Value, key_field: &str) -> Option<String> {
    match record.get(key_field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Apply `change` onto `snapshot`, entry by entry in list order.
///
/// Later entries win over earlier ones for the same record.
pub fn apply_changes(
    dataset_id: &DatasetId,
    snapshot: &Dataset,
    change: &DatasetChange,
) -> Result<Dataset, AmendmentError> {
    if !snapshot.has_consistent_shape() {
        return Err(AmendmentError::ShapeMismatch(dataset_id.clone()));
    }
    let mut result = snapshot.clone();
    let key_field = snapshot.schema.key_field.as_deref();

    for (position, raw) in change.contents.iter().enumerate() {
        let malformed = |reason: &str| AmendmentError::MalformedChange {
            dataset: dataset_id.clone(),
            index: position,
            reason: reason.to_string(),
        };
        let entry: RecordChange =
            serde_json::from_value(raw.clone()).map_err(|e| malformed(&e.to_string()))?;

        match &mut result.contents {
            DatasetContents::Map(records) => match entry {
                RecordChange::Insert { key, record, .. } => {
                    let key = key.ok_or_else(|| malformed("map change without key"))?;
                    records.insert(key, record);
                }
                RecordChange::Update { key, record, .. } => {
                    let key = key.ok_or_else(|| malformed("map change without key"))?;
                    match records.get_mut(&key) {
                        Some(existing) => merge_record(existing, record),
                        None => {
                            records.insert(key, record);
                        }
                    }
                }
                RecordChange::Delete { key, .. } => {
                    let key = key.ok_or_else(|| malformed("map change without key"))?;
                    records.remove(&key);
                }
            },
            DatasetContents::List(records) => {
                let locate = |records: &Vec<Value>, key: &Option<String>, index: Option<usize>| {
                    match (key, key_field) {
                        (Some(key), Some(field)) => records
                            .iter()
                            .position(|r| key_of(r, field).as_deref() == Some(key.as_str())),
                        _ => index.filter(|i| *i < records.len()),
                    }
                };
                match entry {
                    RecordChange::Insert { key, index, record } => {
                        match locate(records, &key, None) {
                            Some(existing) if key.is_some() => records[existing] = record,
                            _ => match index {
                                Some(i) => records.insert(i.min(records.len()), record),
                                None => records.push(record),
                            },
                        }
                    }
                    RecordChange::Update { key, index, record } => {
                        if key.is_none() && index.is_none() {
                            return Err(malformed("list update without key or index"));
                        }
                        if key.is_some() && key_field.is_none() && index.is_none() {
                            return Err(malformed(
                                "keyed list update on a schema without a key field",
                            ));
                        }
                        match locate(records, &key, index) {
                            Some(i) => merge_record(&mut records[i], record),
                            None if key.is_some() => records.push(record),
                            None => return Err(malformed("list update index out of range")),
                        }
                    }
                    RecordChange::Delete { key, index } => {
                        if key.is_none() && index.is_none() {
                            return Err(malformed("list delete without key or index"));
                        }
                        if key.is_some() && key_field.is_none() && index.is_none() {
                            return Err(malformed(
                                "keyed list delete on a schema without a key field",
                            ));
                        }
                        if let Some(i) = locate(records, &key, index) {
                            records.remove(i);
                        }
                    }
                }
            }
        }
    }
    Ok(result)
}

/// Store-backed patcher sharing the resolver's memo.
pub struct DatasetPatcher {
    store: Arc<DocumentStore>,
    resolver: Arc<AnnexResolver>,
}

impl DatasetPatcher {
    pub fn new(store: Arc<DocumentStore>, resolver: Arc<AnnexResolver>) -> Self {
        Self { store, resolver }
    }

    pub async fn changes(
        &self,
        publication: &PublicationId,
        target: IssueId,
        dataset: Option<&DatasetId>,
        freshness: Freshness,
    ) -> Result<DatasetPatch, ApiError> {
        let Some(annex) = self.resolver.latest(target, publication, freshness).await? else {
            return Ok(DatasetPatch::NoData);
        };
        let issues = self.store.issues.index().await?;
        Ok(collect_changes(&issues, &annex, target, dataset))
    }

    /// The annexed snapshot of `dataset` with intervening amendments applied.
    /// `None` when there is no prior snapshot.
    pub async fn materialize(
        &self,
        publication: &PublicationId,
        target: IssueId,
        dataset: &DatasetId,
        freshness: Freshness,
    ) -> Result<Option<Dataset>, ApiError> {
        let Some(annex) = self.resolver.latest(target, publication, freshness).await? else {
            return Ok(None);
        };
        let issues = self.store.issues.index().await?;
        let snapshot = issues
            .get(&annex.issue_id)
            .and_then(|issue| issue.annexes.get(publication))
            .and_then(|position| position.as_ref())
            .and_then(|position| position.dataset(dataset));
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };

        match collect_changes(&issues, &annex, target, Some(dataset)) {
            DatasetPatch::Changes(changes) => {
                let change = changes.get(dataset).cloned().unwrap_or_default();
                Ok(Some(apply_changes(dataset, snapshot, &change)?))
            }
            DatasetPatch::NoData => Ok(None),
        }
    }
}
