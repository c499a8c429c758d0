//! Blocking git2 operations against one working tree.
//!
//! Everything here runs on a blocking thread; the controller owns scheduling,
//! locking and state transitions.

use crate::error::SyncError;
use crate::sync::credentials::Credentials;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Cred, Direction, ErrorClass, ErrorCode, FetchOptions, IndexAddOption, ObjectType, Oid,
    ProxyOptions, PushOptions, Remote, RemoteCallbacks, Repository, Signature, StatusOptions,
};
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const REMOTE_NAME: &str = "origin";

/// Identity recorded on commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Connection settings for one repository.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub root: PathBuf,
    pub remote_url: Option<String>,
    pub branch: String,
    /// History depth for the initial clone; 0 clones full history.
    pub clone_depth: u32,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    FastForwarded,
}

/// Map a git2 error onto the sync error taxonomy.
pub fn classify(err: git2::Error, cancelled: bool) -> SyncError {
    if cancelled || err.code() == ErrorCode::User {
        return SyncError::Cancelled;
    }
    let message = err.message().to_string();
    match (err.code(), err.class()) {
        (ErrorCode::Auth, _) | (ErrorCode::Certificate, _) => {
            SyncError::AuthenticationFailed(message)
        }
        (ErrorCode::NotFastForward, _) => SyncError::PushRejected(message),
        (_, ErrorClass::Http) if message.contains("401") || message.contains("403") => {
            SyncError::AuthenticationFailed(message)
        }
        (_, ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Os) => {
            SyncError::NetworkUnavailable(message)
        }
        _ => SyncError::Git(err),
    }
}

pub(crate) struct GitBackend {
    settings: RemoteSettings,
    credentials: Option<Credentials>,
    cancel: Arc<AtomicBool>,
}

impl GitBackend {
    pub(crate) fn new(
        settings: RemoteSettings,
        credentials: Option<Credentials>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            settings,
            credentials,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn check_cancel(&self) -> Result<(), SyncError> {
        if self.cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn map_err(&self, err: git2::Error) -> SyncError {
        classify(err, self.cancelled())
    }

    fn remote_url(&self) -> Result<&str, SyncError> {
        self.settings.remote_url.as_deref().ok_or(SyncError::NoRemote)
    }

    fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.settings.branch)
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", REMOTE_NAME, self.settings.branch)
    }

    fn fetch_refspec(&self) -> String {
        format!("+{}:{}", self.branch_ref(), self.tracking_ref())
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0u32;
        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts += 1;
            // libgit2 keeps asking after a rejection; one attempt per kind is enough.
            if attempts > 1 {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "credentials were rejected by the remote",
                ));
            }
            match &self.credentials {
                Some(creds) if allowed.is_user_pass_plaintext() => {
                    Cred::userpass_plaintext(&creds.username, &creds.password)
                }
                _ if allowed.is_ssh_key() => {
                    Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
                }
                _ if allowed.is_default() => Cred::default(),
                _ => Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "remote requires credentials",
                )),
            }
        });
        let cancel = self.cancel.clone();
        callbacks.transfer_progress(move |_| !cancel.load(Ordering::SeqCst));
        let cancel = self.cancel.clone();
        callbacks.sideband_progress(move |_| !cancel.load(Ordering::SeqCst));
        callbacks
    }

    fn proxy_options(&self) -> Option<ProxyOptions<'_>> {
        self.settings.proxy.as_deref().map(|url| {
            let mut proxy = ProxyOptions::new();
            proxy.url(url);
            proxy
        })
    }

    fn fetch_options(&self, depth: u32) -> FetchOptions<'_> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        if let Some(proxy) = self.proxy_options() {
            options.proxy_options(proxy);
        }
        if depth > 0 {
            options.depth(depth as i32);
        }
        options
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.settings.root.join(".git").exists()
    }

    pub(crate) fn open(&self) -> Result<Repository, SyncError> {
        if !self.is_initialized() {
            return Err(SyncError::NotInitialized(self.settings.root.clone()));
        }
        Repository::open(&self.settings.root).map_err(SyncError::Git)
    }

    /// Bounded-depth, single-branch clone into the root directory.
    pub(crate) fn clone_repo(&self) -> Result<Repository, SyncError> {
        let url = self.remote_url()?.to_string();
        let refspec = self.fetch_refspec();
        info!(url = %url, branch = %self.settings.branch, depth = self.settings.clone_depth, "Cloning repository");

        let mut builder = RepoBuilder::new();
        builder
            .branch(&self.settings.branch)
            .fetch_options(self.fetch_options(self.settings.clone_depth))
            .remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));
        builder
            .clone(&url, &self.settings.root)
            .map_err(|e| self.map_err(e))
    }

    fn origin<'r>(&self, repo: &'r Repository) -> Result<Remote<'r>, SyncError> {
        match repo.find_remote(REMOTE_NAME) {
            Ok(remote) => Ok(remote),
            Err(e) if e.code() == ErrorCode::NotFound => {
                let url = self.remote_url()?;
                repo.remote_with_fetch(REMOTE_NAME, url, &self.fetch_refspec())
                    .map_err(SyncError::Git)
            }
            Err(e) => Err(SyncError::Git(e)),
        }
    }

    /// Fetch the branch and fast-forward the working tree. Never merges.
    pub(crate) fn pull(&self, repo: &Repository) -> Result<PullOutcome, SyncError> {
        self.check_cancel()?;
        let mut remote = self.origin(repo)?;
        let mut options = self.fetch_options(0);
        remote
            .fetch(&[self.fetch_refspec()], Some(&mut options), None)
            .map_err(|e| self.map_err(e))?;
        self.check_cancel()?;

        let upstream = match repo.refname_to_id(&self.tracking_ref()) {
            Ok(oid) => oid,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(branch = %self.settings.branch, "Remote branch absent; nothing to pull");
                return Ok(PullOutcome::UpToDate);
            }
            Err(e) => return Err(SyncError::Git(e)),
        };
        let annotated = repo.find_annotated_commit(upstream)?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(PullOutcome::UpToDate);
        }
        if !(analysis.is_fast_forward() || analysis.is_unborn()) {
            return Err(SyncError::Diverged {
                branch: self.settings.branch.clone(),
            });
        }

        // Check out first so a conflicting working tree leaves the branch where it was.
        let target = repo.find_object(upstream, Some(ObjectType::Commit))?;
        repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
        let branch_ref = self.branch_ref();
        repo.reference(&branch_ref, upstream, true, "gazette: fast-forward")?;
        repo.set_head(&branch_ref)?;
        info!(branch = %self.settings.branch, to = %upstream, "Fast-forwarded");
        Ok(PullOutcome::FastForwarded)
    }

    /// Working-tree paths that differ from HEAD, sorted. Ignored files are excluded.
    pub(crate) fn changed_files(&self, repo: &Repository) -> Result<Vec<String>, SyncError> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .include_unmodified(false);
        let statuses = repo.statuses(Some(&mut options))?;
        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Local commits not yet on the remote branch.
    pub(crate) fn ahead_of_remote(&self, repo: &Repository) -> Result<usize, SyncError> {
        let local = match repo.refname_to_id(&self.branch_ref()) {
            Ok(oid) => oid,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(0),
            Err(e) => return Err(SyncError::Git(e)),
        };
        match repo.refname_to_id(&self.tracking_ref()) {
            Ok(upstream) => Ok(repo.graph_ahead_behind(local, upstream)?.0),
            Err(e) if e.code() == ErrorCode::NotFound => {
                let mut walk = repo.revwalk()?;
                walk.push(local)?;
                Ok(walk.count())
            }
            Err(e) => Err(SyncError::Git(e)),
        }
    }

    /// Stage additions, modifications and deletions, then commit on HEAD.
    pub(crate) fn commit_all(
        &self,
        repo: &Repository,
        message: &str,
        author: &Author,
    ) -> Result<Oid, SyncError> {
        let mut index = repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;

        let signature = Signature::now(&author.name, &author.email)?;
        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(SyncError::Git(e)),
        };
        let parents: Vec<_> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(commit = %oid, author = %author.name, "Committed working tree");
        Ok(oid)
    }

    pub(crate) fn push(&self, repo: &Repository) -> Result<(), SyncError> {
        self.check_cancel()?;
        let mut remote = self.origin(repo)?;
        let refspec = format!("{0}:{0}", self.branch_ref());
        let rejection: RefCell<Option<String>> = RefCell::new(None);

        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(message.to_string());
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            if let Some(proxy) = self.proxy_options() {
                options.proxy_options(proxy);
            }
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| self.map_err(e))?;
        }

        if let Some(message) = rejection.into_inner() {
            return Err(SyncError::PushRejected(message));
        }

        let head = repo.refname_to_id(&self.branch_ref())?;
        repo.reference(&self.tracking_ref(), head, true, "gazette: push")?;
        info!(branch = %self.settings.branch, commit = %head, "Pushed");
        Ok(())
    }

    /// Connect and list remote refs without touching the working tree.
    pub(crate) fn probe(&self) -> Result<Vec<String>, SyncError> {
        let url = self.remote_url()?;
        let mut remote = Remote::create_detached(url)?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(self.callbacks()), self.proxy_options())
            .map_err(|e| self.map_err(e))?;
        let heads = connection
            .list()
            .map_err(|e| self.map_err(e))?
            .iter()
            .map(|head| head.name().to_string())
            .collect();
        Ok(heads)
    }
}
