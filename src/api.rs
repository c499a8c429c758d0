//! External interface
//!
//! Named operations over JSON. A request carries the operation in `method`
//! and its arguments in `params`; the response wraps one result record.
//! Dates travel as ISO-8601 strings and come back as dates through serde.

use crate::annex::Freshness;
use crate::error::ApiError;
use crate::model::issue::MessageBlock;
use crate::model::{Dataset, Issue, Message, Publication};
use crate::session::GazetteSession;
use crate::store::Document;
use crate::types::{DatasetId, IssueId, PublicationId};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    GetIndex { collection: String },
    #[serde(rename_all = "camelCase")]
    ReloadIndex {
        #[serde(default)]
        collection: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GetIssue { id: IssueId },
    #[serde(rename_all = "camelCase")]
    ScheduleIssue {
        id: IssueId,
        publication_date: NaiveDate,
        cutoff_date: NaiveDate,
    },
    #[serde(rename_all = "camelCase")]
    AddMessage {
        issue: IssueId,
        block: MessageBlock,
        message: Message,
        #[serde(default)]
        index: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    EditMessage {
        issue: IssueId,
        block: MessageBlock,
        index: usize,
        message: Message,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessage {
        issue: IssueId,
        block: MessageBlock,
        index: usize,
    },
    #[serde(rename_all = "camelCase")]
    SetAnnexPosition {
        issue: IssueId,
        publication: PublicationId,
        #[serde(default)]
        position_date: Option<NaiveDate>,
    },
    #[serde(rename_all = "camelCase")]
    ClearAnnex {
        issue: IssueId,
        publication: PublicationId,
    },
    #[serde(rename_all = "camelCase")]
    AttachDataset {
        issue: IssueId,
        publication: PublicationId,
        dataset: DatasetId,
        snapshot: Dataset,
    },
    #[serde(rename_all = "camelCase")]
    RunningAnnexes {
        target: IssueId,
        #[serde(default)]
        publication: Option<PublicationId>,
        #[serde(default)]
        force_reload: bool,
    },
    #[serde(rename_all = "camelCase")]
    DatasetChanges {
        publication: PublicationId,
        target: IssueId,
        #[serde(default)]
        dataset: Option<DatasetId>,
        #[serde(default)]
        force_reload: bool,
    },
    #[serde(rename_all = "camelCase")]
    MaterializeDataset {
        publication: PublicationId,
        target: IssueId,
        dataset: DatasetId,
        #[serde(default)]
        force_reload: bool,
    },
    Schedule,
    SyncStatus,
    EnsureInitialized,
    ListChangedFiles,
    #[serde(rename_all = "camelCase")]
    CommitAndPush { message: String },
    ValidateCredentials,
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Request::GetIndex { .. } => "getIndex",
            Request::ReloadIndex { .. } => "reloadIndex",
            Request::GetIssue { .. } => "getIssue",
            Request::ScheduleIssue { .. } => "scheduleIssue",
            Request::AddMessage { .. } => "addMessage",
            Request::EditMessage { .. } => "editMessage",
            Request::DeleteMessage { .. } => "deleteMessage",
            Request::SetAnnexPosition { .. } => "setAnnexPosition",
            Request::ClearAnnex { .. } => "clearAnnex",
            Request::AttachDataset { .. } => "attachDataset",
            Request::RunningAnnexes { .. } => "runningAnnexes",
            Request::DatasetChanges { .. } => "datasetChanges",
            Request::MaterializeDataset { .. } => "materializeDataset",
            Request::Schedule => "schedule",
            Request::SyncStatus => "syncStatus",
            Request::EnsureInitialized => "ensureInitialized",
            Request::ListChangedFiles => "listChangedFiles",
            Request::CommitAndPush { .. } => "commitAndPush",
            Request::ValidateCredentials => "validateCredentials",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub result: Value,
}

impl Response {
    fn of<T: Serialize>(value: T) -> Result<Self, ApiError> {
        let result = serde_json::to_value(value).map_err(crate::error::StorageError::from)?;
        Ok(Self { result })
    }

    fn ok() -> Self {
        Self {
            result: json!({"ok": true}),
        }
    }

    /// Decode the result record into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.result.clone())
            .map_err(|e| ApiError::InvalidRequest(format!("unexpected result shape: {}", e)))
    }
}

fn freshness(force_reload: bool) -> Freshness {
    if force_reload {
        Freshness::ForceReload
    } else {
        Freshness::Cached
    }
}

/// Request dispatcher bound to one session.
pub struct GazetteApi {
    session: Arc<GazetteSession>,
}

impl GazetteApi {
    pub fn new(session: Arc<GazetteSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &GazetteSession {
        &self.session
    }

    /// Parse and dispatch a raw JSON request.
    pub async fn handle_json(&self, raw: Value) -> Result<Response, ApiError> {
        let request: Request = serde_json::from_value(raw)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.handle(request).await
    }

    pub async fn handle(&self, request: Request) -> Result<Response, ApiError> {
        debug!(method = request.method(), "Handling request");
        let s = &self.session;
        match request {
            Request::GetIndex { collection } => {
                if collection == Issue::COLLECTION {
                    let index = s.store.issues.index().await?;
                    Response::of(index.values().collect::<Vec<_>>())
                } else if collection == Publication::COLLECTION {
                    let index = s.store.publications.index().await?;
                    Response::of(index.values().collect::<Vec<_>>())
                } else {
                    Err(ApiError::UnknownCollection(collection))
                }
            }
            Request::ReloadIndex { collection } => {
                match collection {
                    None => s.store.reload_all().await?,
                    Some(name) if name == Issue::COLLECTION => {
                        s.store.issues.reload().await?;
                    }
                    Some(name) if name == Publication::COLLECTION => {
                        s.store.publications.reload().await?;
                    }
                    Some(other) => return Err(ApiError::UnknownCollection(other)),
                }
                Response::of(json!({
                    "generation": s.store.generation(),
                    "skipped": s.store.issues.last_report().skipped.len()
                        + s.store.publications.last_report().skipped.len(),
                }))
            }
            Request::GetIssue { id } => {
                let issue = s
                    .store
                    .issues
                    .get(&id)
                    .await?
                    .ok_or(ApiError::IssueNotFound(id))?;
                Response::of(issue)
            }
            Request::ScheduleIssue {
                id,
                publication_date,
                cutoff_date,
            } => Response::of(
                s.editor
                    .schedule_issue(id, publication_date, cutoff_date)
                    .await?,
            ),
            Request::AddMessage {
                issue,
                block,
                message,
                index,
            } => {
                let position = s.editor.add_message(issue, block, message, index).await?;
                Response::of(json!({ "index": position }))
            }
            Request::EditMessage {
                issue,
                block,
                index,
                message,
            } => {
                s.editor.edit_message(issue, block, index, message).await?;
                Ok(Response::ok())
            }
            Request::DeleteMessage {
                issue,
                block,
                index,
            } => Response::of(s.editor.delete_message(issue, block, index).await?),
            Request::SetAnnexPosition {
                issue,
                publication,
                position_date,
            } => {
                s.editor
                    .set_annex_position(issue, publication, position_date)
                    .await?;
                Ok(Response::ok())
            }
            Request::ClearAnnex { issue, publication } => {
                s.editor.clear_annex(issue, &publication).await?;
                Ok(Response::ok())
            }
            Request::AttachDataset {
                issue,
                publication,
                dataset,
                snapshot,
            } => {
                s.editor
                    .attach_dataset(issue, publication, dataset, snapshot)
                    .await?;
                Ok(Response::ok())
            }
            Request::RunningAnnexes {
                target,
                publication,
                force_reload,
            } => {
                let annexes = s
                    .resolver
                    .resolve(target, publication.as_ref(), freshness(force_reload))
                    .await?;
                Response::of(annexes.as_ref())
            }
            Request::DatasetChanges {
                publication,
                target,
                dataset,
                force_reload,
            } => Response::of(
                s.patcher
                    .changes(&publication, target, dataset.as_ref(), freshness(force_reload))
                    .await?,
            ),
            Request::MaterializeDataset {
                publication,
                target,
                dataset,
                force_reload,
            } => Response::of(
                s.patcher
                    .materialize(&publication, target, &dataset, freshness(force_reload))
                    .await?,
            ),
            Request::Schedule => Response::of(s.schedule.entries().await?.as_ref()),
            Request::SyncStatus => Response::of(json!({
                "state": s.sync.state(),
                "initialized": s.sync.is_initialized(),
                "branch": s.sync.settings().branch,
            })),
            Request::EnsureInitialized => Response::of(s.initialize().await?),
            Request::ListChangedFiles => Response::of(s.sync.list_changed_files().await?),
            Request::CommitAndPush { message } => Response::of(s.commit_and_push(&message).await?),
            Request::ValidateCredentials => {
                let heads = s.sync.validate_credentials().await?;
                Response::of(json!({ "valid": true, "heads": heads }))
            }
        }
    }
}
