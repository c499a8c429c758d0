//! Integration tests for the document store: layout, merge-writes, repair and isolation

use gazette::concurrency::WorkingTreeLocks;
use gazette::model::issue::{AMENDMENT_MESSAGES, ANNEXES, GENERAL_MESSAGES};
use gazette::model::{AnnexedPosition, Issue, Message, Publication};
use gazette::store::{ChangeKind, DocumentStore};
use gazette::types::{IssueId, PublicationId};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn store_at(root: &Path) -> DocumentStore {
    DocumentStore::new(root, Arc::new(WorkingTreeLocks::new()))
}

fn issue(id: u64) -> Issue {
    Issue::scheduled(
        IssueId(id),
        "2024-02-01".parse().unwrap(),
        "2024-01-25".parse().unwrap(),
    )
}

fn notice(text: &str) -> Message {
    serde_json::from_value(json!({"type": "notice", "text": text})).unwrap()
}

fn read(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_layout_one_file_per_structured_field() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    store.issues.store(&issue(3)).await.unwrap();

    let dir = temp.path().join("issues").join("3");
    for file in [
        "meta.json",
        "general-messages.json",
        "amendment-messages.json",
        "annexes.json",
    ] {
        assert!(dir.join(file).is_file(), "{} should exist", file);
    }
    let meta = read(&dir.join("meta.json"));
    assert_eq!(meta["publicationDate"], "2024-02-01");
    assert!(meta.get(GENERAL_MESSAGES).is_none());
}

#[tokio::test]
async fn test_partial_store_leaves_other_files_byte_identical() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    let mut doc = issue(4);
    doc.annexes.insert(
        PublicationId::new("A"),
        Some(AnnexedPosition::at("2024-01-01".parse().unwrap())),
    );
    store.issues.store(&doc).await.unwrap();

    let annexes_path = store.issues.field_path(&doc.id, ANNEXES).unwrap();
    let amendments_path = store.issues.field_path(&doc.id, AMENDMENT_MESSAGES).unwrap();
    let annexes_before = fs::read(&annexes_path).unwrap();
    let amendments_before = fs::read(&amendments_path).unwrap();

    doc.general_messages.push(notice("only this changes"));
    store
        .issues
        .store_fields(&doc, &[GENERAL_MESSAGES])
        .await
        .unwrap();

    assert_eq!(fs::read(&annexes_path).unwrap(), annexes_before);
    assert_eq!(fs::read(&amendments_path).unwrap(), amendments_before);
    let general = read(&store.issues.field_path(&doc.id, GENERAL_MESSAGES).unwrap());
    assert_eq!(general[0]["text"], "only this changes");
}

#[tokio::test]
async fn test_identical_store_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    let mut doc = issue(5);
    doc.general_messages.push(notice("same"));
    store.issues.store(&doc).await.unwrap();
    let meta = store.issues.meta_path(&doc.id);
    let first = fs::read(&meta).unwrap();

    store.issues.store(&doc).await.unwrap();
    assert_eq!(fs::read(&meta).unwrap(), first);
    assert!(first.ends_with(b"\n"));
}

#[tokio::test]
async fn test_merge_write_keeps_unknown_keys() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    store.issues.store(&issue(6)).await.unwrap();

    // A newer writer added a key this version does not model.
    let meta_path = store.issues.meta_path(&IssueId(6));
    let mut meta = read(&meta_path);
    meta["editor"] = json!("someone");
    fs::write(&meta_path, serde_json::to_vec_pretty(&meta).unwrap()).unwrap();

    let mut doc = store.issues.reload().await.unwrap()[&IssueId(6)].clone();
    doc.cutoff_date = "2024-01-28".parse().unwrap();
    store.issues.store(&doc).await.unwrap();

    let meta = read(&meta_path);
    assert_eq!(meta["editor"], "someone");
    assert_eq!(meta["cutoffDate"], "2024-01-28");
}

#[tokio::test]
async fn test_round_trip_through_fresh_store() {
    let temp = TempDir::new().unwrap();
    let mut doc = issue(8);
    doc.general_messages.push(notice("kept"));
    doc.annexes.insert(PublicationId::new("Z"), None);
    store_at(temp.path()).issues.store(&doc).await.unwrap();

    let reopened = store_at(temp.path());
    assert_eq!(reopened.issues.get(&IssueId(8)).await.unwrap(), Some(doc));
}

#[tokio::test]
async fn test_legacy_shapes_are_repaired_on_load() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("issues").join("12");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("meta.json"),
        r#"{"publicationDate": "2023-05-01", "cutoffDate": "2023-04-20"}"#,
    )
    .unwrap();
    fs::write(
        dir.join("general-messages.json"),
        r#"{"messages": [{"type": "notice", "text": "old"}]}"#,
    )
    .unwrap();
    fs::write(dir.join("annexes.json"), r#"["A", "B"]"#).unwrap();

    let store = store_at(temp.path());
    let loaded = store.issues.get(&IssueId(12)).await.unwrap().unwrap();
    assert_eq!(loaded.id, IssueId(12));
    assert_eq!(loaded.general_messages.len(), 1);
    assert!(loaded.amendment_messages.is_empty());
    assert_eq!(loaded.annexes.len(), 2);
    assert!(loaded.annexes.values().all(Option::is_none));
}

#[tokio::test]
async fn test_broken_objects_are_skipped_not_fatal() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    store.issues.store(&issue(1)).await.unwrap();

    let missing_meta = temp.path().join("issues").join("2");
    fs::create_dir_all(&missing_meta).unwrap();
    fs::write(missing_meta.join("annexes.json"), "{}").unwrap();

    let malformed = temp.path().join("issues").join("3");
    fs::create_dir_all(&malformed).unwrap();
    fs::write(
        malformed.join("meta.json"),
        r#"{"publicationDate": "2023-05-01", "cutoffDate": "2023-04-20"}"#,
    )
    .unwrap();
    fs::write(malformed.join("general-messages.json"), "[{not json").unwrap();

    let index = store.issues.reload().await.unwrap();
    assert_eq!(index.keys().copied().collect::<Vec<_>>(), vec![IssueId(1)]);
    assert_eq!(store.issues.last_report().skipped.len(), 2);
}

#[tokio::test]
async fn test_writes_publish_index_changes() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    let mut events = store.subscribe();
    let before = store.generation();
    let annex_before = store.annex_generation();

    let mut doc = issue(2);
    store.issues.store(&doc).await.unwrap();
    let stored = events.recv().await.unwrap();
    assert_eq!(stored.collection, "issues");
    assert_eq!(stored.id.as_deref(), Some("2"));
    assert_eq!(stored.kind, ChangeKind::Stored);
    assert!(store.generation() > before);

    doc.general_messages.push(notice("x"));
    store
        .issues
        .store_fields(&doc, &[GENERAL_MESSAGES])
        .await
        .unwrap();
    let partial = events.recv().await.unwrap();
    assert_eq!(partial.fields, vec![GENERAL_MESSAGES.to_string()]);
    let annex_after_messages = store.annex_generation();

    doc.annexes.insert(PublicationId::new("A"), None);
    store.issues.store_fields(&doc, &[ANNEXES]).await.unwrap();
    assert!(store.annex_generation() > annex_after_messages);
    assert!(annex_after_messages > annex_before);
}

#[tokio::test]
async fn test_delete_keeps_files_on_disk() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    store.issues.store(&issue(9)).await.unwrap();

    assert!(store.issues.delete(&IssueId(9)).await.unwrap());
    assert!(store.issues.get(&IssueId(9)).await.unwrap().is_none());
    assert!(store.issues.meta_path(&IssueId(9)).exists());

    // A reload picks the object up again from disk.
    assert!(store.issues.reload().await.unwrap().contains_key(&IssueId(9)));
}

#[tokio::test]
async fn test_publications_collection() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    let publication = Publication::new("A", "Official Journal");
    store.publications.store(&publication).await.unwrap();

    let index = store.publications.reload().await.unwrap();
    assert_eq!(index.get(&PublicationId::new("A")), Some(&publication));
    assert!(temp.path().join("publications").join("A").join("meta.json").is_file());
}

#[tokio::test]
async fn test_index_after_narrower_store_matches_disk() {
    let temp = TempDir::new().unwrap();
    let store = store_at(temp.path());
    let mut doc = issue(1);
    doc.annexes.insert(
        PublicationId::new("A"),
        Some(AnnexedPosition::at("2024-01-01".parse().unwrap())),
    );
    store.issues.store(&doc).await.unwrap();

    // The merge keeps annex A on disk even though this copy no longer carries it.
    store.issues.store(&issue(1)).await.unwrap();

    let cached = store.issues.index().await.unwrap()[&IssueId(1)].clone();
    let reloaded = store.issues.reload().await.unwrap()[&IssueId(1)].clone();
    assert_eq!(cached, reloaded);
    assert!(cached.annexes.contains_key(&PublicationId::new("A")));
}
