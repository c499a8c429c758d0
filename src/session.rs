//! Session wiring
//!
//! One session owns every service bound to a working tree: the document
//! store, the sync controller, the resolver and patcher, and the editor. The
//! working-tree lock registry is shared between store and sync.

use crate::amendment::DatasetPatcher;
use crate::annex::AnnexResolver;
use crate::concurrency::WorkingTreeLocks;
use crate::config::GazetteConfig;
use crate::editing::{IssueEditor, ScheduleView};
use crate::error::ApiError;
use crate::store::DocumentStore;
use crate::sync::{Author, CommitOutcome, CredentialProvider, InitOutcome, SyncController};
use std::sync::Arc;
use tracing::{info, warn};

pub struct GazetteSession {
    config: GazetteConfig,
    pub store: Arc<DocumentStore>,
    pub sync: Arc<SyncController>,
    pub resolver: Arc<AnnexResolver>,
    pub patcher: Arc<DatasetPatcher>,
    pub editor: Arc<IssueEditor>,
    pub schedule: Arc<ScheduleView>,
}

impl GazetteSession {
    /// Build all services for the repository named in `config`. Touches neither disk nor network.
    pub fn open(
        config: GazetteConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;

        let locks = Arc::new(WorkingTreeLocks::new());
        let store = Arc::new(DocumentStore::new(&config.repository.root, locks.clone()));
        let sync = Arc::new(SyncController::new(
            config.repository.remote_settings(),
            locks,
            credentials,
        ));
        let resolver = Arc::new(AnnexResolver::new(store.clone()));
        let patcher = Arc::new(DatasetPatcher::new(store.clone(), resolver.clone()));
        let editor = Arc::new(IssueEditor::new(store.clone()));
        let schedule = Arc::new(ScheduleView::new(store.clone()));

        info!(root = %config.repository.root.display(), "Session opened");
        Ok(Self {
            config,
            store,
            sync,
            resolver,
            patcher,
            editor,
            schedule,
        })
    }

    pub fn config(&self) -> &GazetteConfig {
        &self.config
    }

    pub fn author(&self) -> Author {
        self.config.repository.author()
    }

    /// Clone or fast-forward the working tree, then rebuild every index.
    pub async fn initialize(&self) -> Result<InitOutcome, ApiError> {
        let outcome = self.sync.ensure_initialized().await?;
        if outcome != InitOutcome::UpToDate || self.store.issues.cached().is_none() {
            self.store.reload_all().await?;
        }
        Ok(outcome)
    }

    /// Commit and push every working-tree change as the configured author.
    ///
    /// The pull that precedes the commit may bring in remote files, so the
    /// indexes are rebuilt afterwards, also when the push itself fails.
    pub async fn commit_and_push(&self, message: &str) -> Result<CommitOutcome, ApiError> {
        let result = self.sync.commit_and_push(message, &self.author()).await;
        let reloaded = self.store.reload_all().await;
        match result {
            Ok(outcome) => {
                reloaded?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(reload_err) = reloaded {
                    warn!(error = %reload_err, "Index rebuild after failed sync also failed");
                }
                Err(err.into())
            }
        }
    }

    /// Stop in-flight remote work.
    pub fn shutdown(&self) {
        self.sync.cancel();
        info!("Session closed");
    }
}
