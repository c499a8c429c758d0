//! Version-Control Sync Controller
//!
//! Keeps the local working tree in step with one branch of a remote
//! repository: bounded-depth clone, fast-forward-only pulls, change listing,
//! and commit-then-push. Git work runs on blocking threads while the
//! working-tree lock is held, so store writes never interleave with a
//! checkout or a commit.

pub mod credentials;
pub mod git;

pub use credentials::{CredentialProvider, Credentials, EnvCredentials, NoCredentials, StaticCredentials};
pub use git::{Author, PullOutcome, RemoteSettings};

use crate::concurrency::WorkingTreeLocks;
use crate::error::SyncError;
use git::GitBackend;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Observable state of the working tree relative to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Uninitialized,
    Clean,
    LocalChangesPresent,
    Committing,
    Pushing,
    Diverged,
    PushRejected,
    Offline,
    Misconfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitOutcome {
    Cloned,
    FastForwarded,
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CommitOutcome {
    /// No changed files and no unpushed commits.
    NothingToCommit,
    /// A new commit was created and pushed.
    #[serde(rename_all = "camelCase")]
    Pushed { commit: String, files: Vec<String> },
    /// Nothing new to commit; earlier unpushed commits were pushed.
    #[serde(rename_all = "camelCase")]
    PushedPending { commits: usize },
}

pub struct SyncController {
    settings: RemoteSettings,
    locks: Arc<WorkingTreeLocks>,
    provider: RwLock<Arc<dyn CredentialProvider>>,
    state: Arc<watch::Sender<SyncState>>,
    cancel: Arc<AtomicBool>,
    /// Set after an authentication failure; network operations fail fast until cleared.
    auth_blocked: AtomicBool,
}

impl SyncController {
    pub fn new(
        settings: RemoteSettings,
        locks: Arc<WorkingTreeLocks>,
        provider: Arc<dyn CredentialProvider>,
    ) -> Self {
        let initial = if settings.root.join(".git").exists() {
            SyncState::Clean
        } else {
            SyncState::Uninitialized
        };
        let (state, _) = watch::channel(initial);
        Self {
            settings,
            locks,
            provider: RwLock::new(provider),
            state: Arc::new(state),
            cancel: Arc::new(AtomicBool::new(false)),
            auth_blocked: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.settings.root.join(".git").exists()
    }

    fn set_state(&self, next: SyncState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "Sync state changed");
        }
    }

    /// Request cancellation of the operation in flight.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Swap the credential provider and lift an authentication block.
    pub fn reconfigure(&self, provider: Arc<dyn CredentialProvider>) {
        *self.provider.write() = provider;
        self.auth_blocked.store(false, Ordering::SeqCst);
        if self.state() == SyncState::Misconfigured {
            self.set_state(if self.is_initialized() {
                SyncState::Clean
            } else {
                SyncState::Uninitialized
            });
        }
    }

    fn guard_auth(&self) -> Result<(), SyncError> {
        if self.auth_blocked.load(Ordering::SeqCst) {
            return Err(SyncError::AuthenticationFailed(
                "credentials were rejected; reconfigure before retrying".to_string(),
            ));
        }
        Ok(())
    }

    async fn backend(&self) -> Result<GitBackend, SyncError> {
        let provider = self.provider.read().clone();
        let credentials = match self.settings.remote_url.as_deref() {
            Some(url) => provider.credentials(url).await?,
            None => None,
        };
        self.cancel.store(false, Ordering::SeqCst);
        Ok(GitBackend::new(
            self.settings.clone(),
            credentials,
            self.cancel.clone(),
        ))
    }

    /// Record the state an error implies and hand the error back.
    fn fail(&self, err: SyncError) -> SyncError {
        match &err {
            SyncError::AuthenticationFailed(_) => {
                self.auth_blocked.store(true, Ordering::SeqCst);
                self.set_state(SyncState::Misconfigured);
            }
            SyncError::NoRemote => self.set_state(SyncState::Misconfigured),
            SyncError::NetworkUnavailable(_) => self.set_state(SyncState::Offline),
            SyncError::Diverged { .. } => self.set_state(SyncState::Diverged),
            SyncError::PushRejected(_) => self.set_state(SyncState::PushRejected),
            _ => {}
        }
        warn!(error = %err, "Sync operation failed");
        err
    }

    async fn run_blocking<T, F>(&self, backend: GitBackend, work: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&GitBackend) -> Result<T, SyncError> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || work(&backend))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?
    }

    /// Clean only when the tree matches HEAD and every local commit is on the remote.
    fn settle(&self, changed: usize, ahead: usize) {
        self.set_state(if changed == 0 && ahead == 0 {
            SyncState::Clean
        } else {
            SyncState::LocalChangesPresent
        });
    }

    /// Clone when there is no repository yet, otherwise pull fast-forward only.
    pub async fn ensure_initialized(&self) -> Result<InitOutcome, SyncError> {
        self.guard_auth()?;
        tokio::fs::create_dir_all(&self.settings.root)
            .await
            .map_err(|e| SyncError::Worker(format!("{}: {}", self.settings.root.display(), e)))?;
        let _tree = self.locks.acquire(&self.settings.root).await;
        let backend = self.backend().await?;

        let result = self
            .run_blocking(backend, |git| {
                let (repo, outcome) = if git.is_initialized() {
                    let repo = git.open()?;
                    let outcome = match git.pull(&repo)? {
                        PullOutcome::UpToDate => InitOutcome::UpToDate,
                        PullOutcome::FastForwarded => InitOutcome::FastForwarded,
                    };
                    (repo, outcome)
                } else {
                    (git.clone_repo()?, InitOutcome::Cloned)
                };
                let changed = git.changed_files(&repo)?.len();
                let ahead = git.ahead_of_remote(&repo)?;
                Ok((outcome, changed, ahead))
            })
            .await;

        match result {
            Ok((outcome, changed, ahead)) => {
                info!(outcome = ?outcome, changed, ahead, "Repository ready");
                self.settle(changed, ahead);
                Ok(outcome)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Paths that differ from HEAD, relative to the root and sorted.
    pub async fn list_changed_files(&self) -> Result<Vec<String>, SyncError> {
        let backend = self.backend_offline();
        let (files, ahead) = self
            .run_blocking(backend, |git| {
                let repo = git.open()?;
                Ok((git.changed_files(&repo)?, git.ahead_of_remote(&repo)?))
            })
            .await?;
        self.settle(files.len(), ahead);
        Ok(files)
    }

    fn backend_offline(&self) -> GitBackend {
        GitBackend::new(self.settings.clone(), None, self.cancel.clone())
    }

    /// Pull, commit every change as `author`, and push.
    ///
    /// A failed push keeps the local commit; the next call pushes it.
    pub async fn commit_and_push(
        &self,
        message: &str,
        author: &Author,
    ) -> Result<CommitOutcome, SyncError> {
        self.guard_auth()?;
        let _tree = self.locks.acquire(&self.settings.root).await;
        let backend = self.backend().await?;
        let previous = self.state();
        self.set_state(SyncState::Committing);

        let message = message.to_string();
        let author = author.clone();
        let state = self.state.clone();
        let result = self
            .run_blocking(backend, move |git| {
                let repo = git.open()?;
                git.pull(&repo)?;
                let files = git.changed_files(&repo)?;
                let ahead = git.ahead_of_remote(&repo)?;

                if files.is_empty() && ahead == 0 {
                    return Ok(CommitOutcome::NothingToCommit);
                }
                let commit = if files.is_empty() {
                    None
                } else {
                    Some(git.commit_all(&repo, &message, &author)?)
                };

                state.send_replace(SyncState::Pushing);
                git.push(&repo).map_err(|e| match e {
                    // The commit exists locally; the tree is ahead of the remote.
                    SyncError::NetworkUnavailable(_) | SyncError::Cancelled | SyncError::Git(_) => {
                        state.send_replace(SyncState::LocalChangesPresent);
                        e
                    }
                    other => other,
                })?;

                Ok(match commit {
                    Some(oid) => CommitOutcome::Pushed {
                        commit: oid.to_string(),
                        files,
                    },
                    None => CommitOutcome::PushedPending { commits: ahead },
                })
            })
            .await;

        match result {
            Ok(outcome) => {
                self.set_state(SyncState::Clean);
                Ok(outcome)
            }
            Err(SyncError::NetworkUnavailable(reason)) if self.state() == SyncState::LocalChangesPresent => {
                warn!(reason = %reason, "Push failed after commit; changes kept locally");
                Err(SyncError::NetworkUnavailable(reason))
            }
            Err(SyncError::Cancelled) => {
                if self.state() == SyncState::Committing {
                    self.set_state(previous);
                }
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                let err = self.fail(e);
                match self.state() {
                    // Failed before anything was committed.
                    SyncState::Committing => self.set_state(previous),
                    // A commit may exist locally that the remote lacks.
                    SyncState::Pushing => self.set_state(SyncState::LocalChangesPresent),
                    _ => {}
                }
                Err(err)
            }
        }
    }

    /// Connect to the remote and list its refs. Does not touch the working tree.
    pub async fn validate_credentials(&self) -> Result<Vec<String>, SyncError> {
        let backend = self.backend().await?;
        match self.run_blocking(backend, |git| git.probe()).await {
            Ok(heads) => {
                self.auth_blocked.store(false, Ordering::SeqCst);
                if self.state() == SyncState::Misconfigured {
                    self.set_state(if self.is_initialized() {
                        SyncState::Clean
                    } else {
                        SyncState::Uninitialized
                    });
                }
                info!(heads = heads.len(), "Remote credentials validated");
                Ok(heads)
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}
