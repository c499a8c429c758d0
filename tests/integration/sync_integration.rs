//! Sync controller against local bare remotes

use super::test_utils::{
    commit_everything, push_from_elsewhere, remote_head_message, seeded_remote, session_at,
    set_push_url,
};
use gazette::error::{ApiError, SyncError};
use gazette::sync::{CommitOutcome, InitOutcome, SyncState};
use gazette::types::IssueId;
use git2::Repository;
use tempfile::TempDir;

#[tokio::test]
async fn test_clone_then_up_to_date() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&remote));
    assert_eq!(session.sync.state(), SyncState::Uninitialized);

    assert_eq!(session.initialize().await.unwrap(), InitOutcome::Cloned);
    assert!(tree.join("README.md").is_file());
    assert_eq!(session.sync.state(), SyncState::Clean);

    assert_eq!(session.initialize().await.unwrap(), InitOutcome::UpToDate);
    assert!(session.sync.list_changed_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_write_shows_up_as_changed_paths() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&remote));
    session.initialize().await.unwrap();

    session
        .editor
        .schedule_issue(
            IssueId(1),
            "2024-03-01".parse().unwrap(),
            "2024-02-20".parse().unwrap(),
        )
        .await
        .unwrap();

    let changed = session.sync.list_changed_files().await.unwrap();
    assert_eq!(
        changed,
        vec![
            "issues/1/amendment-messages.json".to_string(),
            "issues/1/annexes.json".to_string(),
            "issues/1/general-messages.json".to_string(),
            "issues/1/meta.json".to_string(),
        ]
    );
    assert_eq!(session.sync.state(), SyncState::LocalChangesPresent);
}

#[tokio::test]
async fn test_commit_and_push_reaches_remote() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&remote));
    session.initialize().await.unwrap();

    session
        .editor
        .schedule_issue(
            IssueId(2),
            "2024-03-01".parse().unwrap(),
            "2024-02-20".parse().unwrap(),
        )
        .await
        .unwrap();

    let outcome = session.commit_and_push("Schedule issue 2").await.unwrap();
    match outcome {
        CommitOutcome::Pushed { files, .. } => assert_eq!(files.len(), 4),
        other => panic!("expected a push, got {:?}", other),
    }
    assert_eq!(remote_head_message(&remote).trim(), "Schedule issue 2");
    assert_eq!(session.sync.state(), SyncState::Clean);

    let again = session.commit_and_push("Nothing new").await.unwrap();
    assert_eq!(again, CommitOutcome::NothingToCommit);
}

#[tokio::test]
async fn test_pull_brings_in_remote_issue() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&remote));
    session.initialize().await.unwrap();

    push_from_elsewhere(
        &temp,
        &remote,
        "issues/5/meta.json",
        r#"{"id": 5, "publicationDate": "2024-04-01", "cutoffDate": "2024-03-25"}"#,
    );

    assert_eq!(
        session.initialize().await.unwrap(),
        InitOutcome::FastForwarded
    );
    let issue = session.store.issues.get(&IssueId(5)).await.unwrap();
    assert!(issue.is_some(), "pulled issue should be indexed after reload");
}

#[tokio::test]
async fn test_local_commit_behind_remote_is_diverged() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&remote));
    session.initialize().await.unwrap();

    std::fs::write(tree.join("local.txt"), "local\n").unwrap();
    let local = Repository::open(&tree).unwrap();
    commit_everything(&local, "Local only");
    push_from_elsewhere(&temp, &remote, "remote.txt", "remote\n");

    let err = session.commit_and_push("Should not merge").await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::SyncError(SyncError::Diverged { .. })
    ));
    assert_eq!(session.sync.state(), SyncState::Diverged);
    assert!(!tree.join("remote.txt").exists());
}

#[tokio::test]
async fn test_failed_push_keeps_commit_until_retry() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&remote));
    session.initialize().await.unwrap();

    session
        .editor
        .schedule_issue(
            IssueId(3),
            "2024-03-01".parse().unwrap(),
            "2024-02-20".parse().unwrap(),
        )
        .await
        .unwrap();

    set_push_url(&tree, Some(&temp.path().join("unreachable.git")));
    assert!(session.commit_and_push("Schedule issue 3").await.is_err());
    assert_eq!(session.sync.state(), SyncState::LocalChangesPresent);
    assert_eq!(remote_head_message(&remote).trim(), "Seed repository");

    // The tree is clean but the branch is one commit ahead of the remote.
    assert!(session.sync.list_changed_files().await.unwrap().is_empty());
    assert_eq!(session.sync.state(), SyncState::LocalChangesPresent);
    assert_eq!(session.initialize().await.unwrap(), InitOutcome::UpToDate);
    assert_eq!(session.sync.state(), SyncState::LocalChangesPresent);

    set_push_url(&tree, None);
    let retried = session.commit_and_push("Nothing new").await.unwrap();
    assert_eq!(retried, CommitOutcome::PushedPending { commits: 1 });
    assert_eq!(remote_head_message(&remote).trim(), "Schedule issue 3");
    assert_eq!(session.sync.state(), SyncState::Clean);
}

#[tokio::test]
async fn test_failed_push_still_indexes_pulled_issues() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&remote));
    session.initialize().await.unwrap();

    push_from_elsewhere(
        &temp,
        &remote,
        "issues/5/meta.json",
        r#"{"id": 5, "publicationDate": "2024-04-01", "cutoffDate": "2024-03-25"}"#,
    );
    std::fs::write(tree.join("local.txt"), "local\n").unwrap();
    set_push_url(&tree, Some(&temp.path().join("unreachable.git")));

    assert!(session.commit_and_push("Local note").await.is_err());
    assert!(tree.join("issues/5/meta.json").is_file());
    let index = session.store.issues.cached().unwrap();
    assert!(index.contains_key(&IssueId(5)));
}

#[tokio::test]
async fn test_probe_lists_remote_heads() {
    let temp = TempDir::new().unwrap();
    let remote = seeded_remote(&temp);
    let session = session_at(&temp.path().join("tree"), Some(&remote));

    let heads = session.sync.validate_credentials().await.unwrap();
    assert!(heads.iter().any(|h| h == "refs/heads/main"));
    assert_eq!(session.sync.state(), SyncState::Uninitialized);
}

#[tokio::test]
async fn test_unreachable_remote_is_not_cloned() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nowhere.git");
    let tree = temp.path().join("tree");
    let session = session_at(&tree, Some(&missing));

    assert!(session.initialize().await.is_err());
    assert!(!session.sync.is_initialized());
}

#[tokio::test]
async fn test_changed_files_before_init() {
    let temp = TempDir::new().unwrap();
    let session = session_at(&temp.path().join("tree"), None);
    let err = session.sync.list_changed_files().await.unwrap_err();
    assert!(matches!(err, SyncError::NotInitialized(_)));
}
