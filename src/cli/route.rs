//! CLI route: single route table and run context. Every command becomes an
//! API request so the CLI and JSON callers share one code path.

use crate::api::{GazetteApi, Request};
use crate::config::ConfigLoader;
use crate::editing::ScheduleEntry;
use crate::error::ApiError;
use crate::model::{Message, RunningAnnex};
use crate::session::GazetteSession;
use crate::sync::{CommitOutcome, CredentialProvider, InitOutcome, SyncState};
use crate::types::{DatasetId, IssueId, PublicationId};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::cli::parse::{
    AnnexCommands, Commands, DatasetCommands, IssueCommands, MessageCommands, OutputFormat,
    SyncCommands,
};
use crate::cli::presentation::{
    format_changed_files, format_commit_outcome, format_init_outcome,
    format_running_annexes_text, format_schedule_text, format_sync_status_text, to_json,
};

#[derive(Deserialize)]
struct SyncStatusView {
    state: SyncState,
    initialized: bool,
    branch: String,
}

#[derive(Deserialize)]
struct ProbeView {
    heads: Vec<String>,
}

/// Runtime context for CLI execution. Built from the workspace root and an
/// optional config path using ConfigLoader only.
pub struct RunContext {
    api: GazetteApi,
    workspace_root: PathBuf,
}

impl RunContext {
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let session = GazetteSession::open(config, credentials)?;
        Ok(Self {
            api: GazetteApi::new(Arc::new(session)),
            workspace_root,
        })
    }

    pub fn api(&self) -> &GazetteApi {
        &self.api
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    /// Cancel in-flight sync work and close the session.
    pub fn shutdown(&self) {
        self.api.session().shutdown();
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = match command {
            Commands::Issue { command } => self.handle_issue(command).await,
            Commands::Message { command } => self.handle_message(command).await,
            Commands::Annex { command } => self.handle_annex(command).await,
            Commands::Dataset { command } => self.handle_dataset(command).await,
            Commands::Sync { command } => self.handle_sync(command).await,
        };
        info!(
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    async fn handle_issue(&self, command: &IssueCommands) -> Result<String, ApiError> {
        match command {
            IssueCommands::Schedule {
                id,
                publication_date,
                cutoff_date,
            } => {
                self.api
                    .handle(Request::ScheduleIssue {
                        id: IssueId(*id),
                        publication_date: *publication_date,
                        cutoff_date: *cutoff_date,
                    })
                    .await?;
                Ok(format!("Scheduled issue {}", id))
            }
            IssueCommands::List { format } => {
                let rows: Vec<ScheduleEntry> =
                    self.api.handle(Request::Schedule).await?.decode()?;
                match format {
                    OutputFormat::Text => Ok(format_schedule_text(&rows)),
                    OutputFormat::Json => to_json(&rows),
                }
            }
            IssueCommands::Show { id } => {
                let response = self.api.handle(Request::GetIssue { id: IssueId(*id) }).await?;
                to_json(&response.result)
            }
        }
    }

    async fn handle_message(&self, command: &MessageCommands) -> Result<String, ApiError> {
        match command {
            MessageCommands::Add {
                issue,
                block,
                json,
                index,
            } => {
                let raw: Value = serde_json::from_str(json)
                    .map_err(|e| ApiError::InvalidRequest(format!("message is not JSON: {}", e)))?;
                let message: Message = serde_json::from_value(raw)
                    .map_err(|e| ApiError::InvalidRequest(format!("invalid message: {}", e)))?;
                #[derive(Deserialize)]
                struct Added {
                    index: usize,
                }
                let added: Added = self
                    .api
                    .handle(Request::AddMessage {
                        issue: IssueId(*issue),
                        block: (*block).into(),
                        message,
                        index: *index,
                    })
                    .await?
                    .decode()?;
                Ok(format!("Added message at index {} of issue {}", added.index, issue))
            }
            MessageCommands::Delete {
                issue,
                block,
                index,
            } => {
                let removed = self
                    .api
                    .handle(Request::DeleteMessage {
                        issue: IssueId(*issue),
                        block: (*block).into(),
                        index: *index,
                    })
                    .await?;
                Ok(format!("Deleted message:\n{}", to_json(&removed.result)?))
            }
        }
    }

    async fn handle_annex(&self, command: &AnnexCommands) -> Result<String, ApiError> {
        match command {
            AnnexCommands::Set {
                issue,
                publication,
                date,
            } => {
                self.api
                    .handle(Request::SetAnnexPosition {
                        issue: IssueId(*issue),
                        publication: PublicationId::new(publication.as_str()),
                        position_date: *date,
                    })
                    .await?;
                Ok(format!("Annexed {} in issue {}", publication, issue))
            }
            AnnexCommands::Clear { issue, publication } => {
                self.api
                    .handle(Request::ClearAnnex {
                        issue: IssueId(*issue),
                        publication: PublicationId::new(publication.as_str()),
                    })
                    .await?;
                Ok(format!("Cleared annex {} in issue {}", publication, issue))
            }
            AnnexCommands::Running {
                target,
                publication,
                reload,
                format,
            } => {
                let annexes: Vec<RunningAnnex> = self
                    .api
                    .handle(Request::RunningAnnexes {
                        target: IssueId(*target),
                        publication: publication.as_deref().map(PublicationId::new),
                        force_reload: *reload,
                    })
                    .await?
                    .decode()?;
                match format {
                    OutputFormat::Text => Ok(format_running_annexes_text(*target, &annexes)),
                    OutputFormat::Json => to_json(&annexes),
                }
            }
        }
    }

    async fn handle_dataset(&self, command: &DatasetCommands) -> Result<String, ApiError> {
        let response = match command {
            DatasetCommands::Changes {
                publication,
                target,
                dataset,
                reload,
            } => {
                self.api
                    .handle(Request::DatasetChanges {
                        publication: PublicationId::new(publication.as_str()),
                        target: IssueId(*target),
                        dataset: dataset.as_deref().map(DatasetId::new),
                        force_reload: *reload,
                    })
                    .await?
            }
            DatasetCommands::Materialize {
                publication,
                target,
                dataset,
                reload,
            } => {
                let response = self
                    .api
                    .handle(Request::MaterializeDataset {
                        publication: PublicationId::new(publication.as_str()),
                        target: IssueId(*target),
                        dataset: DatasetId::new(dataset.as_str()),
                        force_reload: *reload,
                    })
                    .await?;
                if response.result.is_null() {
                    return Ok(format!(
                        "No snapshot of dataset {} for {} before issue {}",
                        dataset, publication, target
                    ));
                }
                response
            }
        };
        to_json(&response.result)
    }

    async fn handle_sync(&self, command: &SyncCommands) -> Result<String, ApiError> {
        match command {
            SyncCommands::Init => {
                let outcome: InitOutcome =
                    self.api.handle(Request::EnsureInitialized).await?.decode()?;
                Ok(format_init_outcome(outcome))
            }
            SyncCommands::Status => {
                let view: SyncStatusView = self.api.handle(Request::SyncStatus).await?.decode()?;
                Ok(format_sync_status_text(
                    view.state,
                    &view.branch,
                    view.initialized,
                ))
            }
            SyncCommands::Changes => {
                let files: Vec<String> =
                    self.api.handle(Request::ListChangedFiles).await?.decode()?;
                Ok(format_changed_files(&files))
            }
            SyncCommands::Commit { message } => {
                let outcome: CommitOutcome = self
                    .api
                    .handle(Request::CommitAndPush {
                        message: message.clone(),
                    })
                    .await?
                    .decode()?;
                Ok(format_commit_outcome(&outcome))
            }
            SyncCommands::Probe => {
                let probe: ProbeView = self
                    .api
                    .handle(Request::ValidateCredentials)
                    .await?
                    .decode()?;
                Ok(format!(
                    "Remote accepted credentials ({} branch(es) advertised)",
                    probe.heads.len()
                ))
            }
        }
    }
}
