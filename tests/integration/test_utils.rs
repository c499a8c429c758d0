//! Shared test utilities for integration tests
//!
//! Sessions over temporary working trees, bare git remotes seeded with one
//! commit, and isolated XDG directories for config tests.

use gazette::api::GazetteApi;
use gazette::config::GazetteConfig;
use gazette::session::GazetteSession;
use gazette::sync::{CredentialProvider, NoCredentials};
use git2::{Repository, RepositoryInitOptions, Signature};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub const BRANCH: &str = "main";

/// Session over `root` with an optional remote. Full-depth clones: the local
/// transport does not negotiate shallow fetches.
pub fn session_at(root: &Path, remote: Option<&Path>) -> Arc<GazetteSession> {
    session_with(root, remote, Arc::new(NoCredentials))
}

pub fn session_with(
    root: &Path,
    remote: Option<&Path>,
    credentials: Arc<dyn CredentialProvider>,
) -> Arc<GazetteSession> {
    let mut config = GazetteConfig::default();
    config.repository.root = root.to_path_buf();
    config.repository.remote_url = remote.map(|p| p.to_string_lossy().into_owned());
    config.repository.branch = BRANCH.to_string();
    config.repository.clone_depth = 0;
    config.repository.author_name = "Test Editor".to_string();
    config.repository.author_email = "editor@example.invalid".to_string();
    Arc::new(GazetteSession::open(config, credentials).unwrap())
}

pub fn api_at(root: &Path) -> GazetteApi {
    GazetteApi::new(session_at(root, None))
}

/// Create a bare repository under `dir` whose `main` holds one commit with a README.
pub fn seeded_remote(dir: &TempDir) -> PathBuf {
    let seed_path = dir.path().join("seed");
    let bare_path = dir.path().join("remote.git");

    let mut opts = RepositoryInitOptions::new();
    opts.initial_head(BRANCH);
    let seed = Repository::init_opts(&seed_path, &opts).unwrap();
    std::fs::write(seed_path.join("README.md"), "gazette\n").unwrap();
    commit_everything(&seed, "Seed repository");

    git2::build::RepoBuilder::new()
        .bare(true)
        .clone(seed_path.to_str().unwrap(), &bare_path)
        .unwrap();
    bare_path
}

/// Stage all files and commit on HEAD, returning the new commit id.
pub fn commit_everything(repo: &Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("Someone Else", "else@example.invalid").unwrap();
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}

/// Push a commit adding `file` to the remote from a separate clone.
pub fn push_from_elsewhere(dir: &TempDir, remote: &Path, file: &str, contents: &str) {
    let other = dir.path().join(format!("other-{}", file.replace('/', "_")));
    let repo = Repository::clone(remote.to_str().unwrap(), &other).unwrap();
    let path = other.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    commit_everything(&repo, "Edit from another clone");
    let mut origin = repo.find_remote("origin").unwrap();
    origin
        .push(&[format!("refs/heads/{0}:refs/heads/{0}", BRANCH)], None)
        .unwrap();
}

/// Message of the commit at the tip of the remote branch.
pub fn remote_head_message(remote: &Path) -> String {
    let repo = Repository::open_bare(remote).unwrap();
    let reference = repo
        .find_reference(&format!("refs/heads/{}", BRANCH))
        .unwrap();
    let commit = reference.peel_to_commit().unwrap();
    commit.message().unwrap_or_default().to_string()
}

/// Run `f` with XDG and HOME pointed into `test_dir`, then restore them.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ["HOME", "XDG_CONFIG_HOME", "XDG_DATA_HOME"]
        .into_iter()
        .map(|key| (key, std::env::var(key).ok()))
        .collect();

    let test_home = test_dir.path().join("home");
    let test_data = test_dir.path().join("data");
    std::fs::create_dir_all(&test_home).unwrap();
    std::fs::create_dir_all(&test_data).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());
    std::env::set_var("XDG_DATA_HOME", &test_data);

    let result = f();

    for (key, value) in saved {
        match value {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }
    result
}

/// Point `origin`'s push URL at `url`, or back at the fetch URL when `None`.
pub fn set_push_url(tree: &Path, url: Option<&Path>) {
    let repo = Repository::open(tree).unwrap();
    let url = url.map(|p| p.to_string_lossy().into_owned());
    repo.remote_set_pushurl("origin", url.as_deref()).unwrap();
}
