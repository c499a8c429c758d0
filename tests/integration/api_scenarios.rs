//! Running annexes and amendment patches driven through the JSON request boundary

use super::test_utils::api_at;
use gazette::api::GazetteApi;
use gazette::error::ApiError;
use gazette::model::RunningAnnex;
use gazette::types::{IssueId, PublicationId};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn call(api: &GazetteApi, raw: Value) -> Value {
    api.handle_json(raw).await.unwrap().result
}

async fn schedule(api: &GazetteApi, id: u64) {
    call(
        api,
        json!({
            "method": "scheduleIssue",
            "params": {"id": id, "publicationDate": "2024-01-01", "cutoffDate": "2023-12-20"}
        }),
    )
    .await;
}

async fn annex(api: &GazetteApi, issue: u64, publication: &str, date: Option<&str>) {
    call(
        api,
        json!({
            "method": "setAnnexPosition",
            "params": {"issue": issue, "publication": publication, "positionDate": date}
        }),
    )
    .await;
}

async fn amend(api: &GazetteApi, issue: u64, publication: &str, contents: Value) {
    call(
        api,
        json!({
            "method": "addMessage",
            "params": {
                "issue": issue,
                "block": "amendment",
                "message": {
                    "type": "amendment",
                    "target": publication,
                    "datasetChanges": {"main": {"contents": contents}}
                }
            }
        }),
    )
    .await;
}

async fn running(api: &GazetteApi, target: u64, publication: Option<&str>) -> Vec<RunningAnnex> {
    let response = api
        .handle_json(json!({
            "method": "runningAnnexes",
            "params": {"target": target, "publication": publication}
        }))
        .await
        .unwrap();
    response.decode().unwrap()
}

#[tokio::test]
async fn test_latest_annex_wins_per_publication() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());
    for id in 1..=3 {
        schedule(&api, id).await;
    }
    annex(&api, 1, "A", Some("2020-01-01")).await;
    annex(&api, 3, "A", Some("2021-06-01")).await;

    let before_four = running(&api, 4, None).await;
    assert_eq!(
        before_four,
        vec![RunningAnnex {
            publication_id: PublicationId::new("A"),
            issue_id: IssueId(3),
            position_date: Some("2021-06-01".parse().unwrap()),
        }]
    );

    let before_three = running(&api, 3, None).await;
    assert_eq!(before_three.len(), 1);
    assert_eq!(before_three[0].issue_id, IssueId(1));
    assert_eq!(
        before_three[0].position_date,
        Some("2020-01-01".parse().unwrap())
    );
}

#[tokio::test]
async fn test_never_annexed_publication_resolves_empty() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());
    schedule(&api, 1).await;
    annex(&api, 1, "A", None).await;

    assert!(running(&api, 10, Some("B")).await.is_empty());
}

#[tokio::test]
async fn test_amendments_between_annex_and_target() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());
    for id in 5..=8 {
        schedule(&api, id).await;
    }
    annex(&api, 5, "C", Some("2024-01-01")).await;
    call(
        &api,
        json!({
            "method": "attachDataset",
            "params": {
                "issue": 5,
                "publication": "C",
                "dataset": "main",
                "snapshot": {
                    "schema": {"shape": "list", "fields": [{"id": "name"}], "keyField": "name"},
                    "contents": [{"name": "a"}, {"name": "b"}, {"name": "c"}]
                }
            }
        }),
    )
    .await;
    amend(&api, 6, "C", json!([{"op": "insert", "record": {"name": "x"}}])).await;
    amend(&api, 7, "C", json!([{"op": "delete", "key": "a"}])).await;

    let patch = call(
        &api,
        json!({"method": "datasetChanges", "params": {"publication": "C", "target": 8}}),
    )
    .await;
    assert_eq!(patch["status"], "changes");
    assert_eq!(
        patch["datasets"]["main"]["contents"],
        json!([
            {"op": "insert", "record": {"name": "x"}},
            {"op": "delete", "key": "a"}
        ])
    );

    // Issue 6's own amendment lies outside the window ending at 6.
    let patch = call(
        &api,
        json!({"method": "datasetChanges", "params": {"publication": "C", "target": 6}}),
    )
    .await;
    assert_eq!(patch["datasets"]["main"]["contents"], json!([]));

    let materialized = call(
        &api,
        json!({
            "method": "materializeDataset",
            "params": {"publication": "C", "target": 8, "dataset": "main"}
        }),
    )
    .await;
    assert_eq!(
        materialized["contents"],
        json!([{"name": "b"}, {"name": "c"}, {"name": "x"}])
    );
}

#[tokio::test]
async fn test_patch_without_prior_annex_is_no_data() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());
    schedule(&api, 1).await;

    let patch = call(
        &api,
        json!({"method": "datasetChanges", "params": {"publication": "C", "target": 2}}),
    )
    .await;
    assert_eq!(patch["status"], "noData");

    let materialized = call(
        &api,
        json!({
            "method": "materializeDataset",
            "params": {"publication": "C", "target": 2, "dataset": "main"}
        }),
    )
    .await;
    assert!(materialized.is_null());
}

#[tokio::test]
async fn test_cleared_annex_still_shadows_older_entries() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());
    for id in 1..=2 {
        schedule(&api, id).await;
    }
    annex(&api, 1, "A", Some("2020-01-01")).await;
    annex(&api, 2, "A", Some("2020-02-01")).await;
    call(
        &api,
        json!({"method": "clearAnnex", "params": {"issue": 2, "publication": "A"}}),
    )
    .await;

    let resolved = running(&api, 3, Some("A")).await;
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].issue_id, IssueId(2));
    assert_eq!(resolved[0].position_date, None);
}

#[tokio::test]
async fn test_schedule_view_reflects_edits() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());
    schedule(&api, 2).await;
    schedule(&api, 1).await;
    call(
        &api,
        json!({
            "method": "addMessage",
            "params": {"issue": 2, "block": "general", "message": {"type": "notice", "text": "hi"}}
        }),
    )
    .await;

    let rows = call(&api, json!({"method": "schedule"})).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[1]["generalMessages"], 1);

    call(
        &api,
        json!({"method": "deleteMessage", "params": {"issue": 2, "block": "general", "index": 0}}),
    )
    .await;
    let rows = call(&api, json!({"method": "schedule"})).await;
    assert_eq!(rows[1]["generalMessages"], 0);
}

#[tokio::test]
async fn test_hard_errors() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());

    let err = api
        .handle_json(json!({"method": "getIndex", "params": {"collection": "drafts"}}))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UnknownCollection(name) if name == "drafts"));

    let err = api
        .handle_json(json!({"method": "getIssue", "params": {"id": 99}}))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::IssueNotFound(IssueId(99))));

    schedule(&api, 1).await;
    let err = api
        .handle_json(json!({
            "method": "scheduleIssue",
            "params": {"id": 1, "publicationDate": "2024-01-01", "cutoffDate": "2023-12-20"}
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::IssueExists(IssueId(1))));
}

#[tokio::test]
async fn test_dates_cross_the_boundary_as_strings() {
    let temp = TempDir::new().unwrap();
    let api = api_at(temp.path());
    schedule(&api, 4).await;
    let issue = call(&api, json!({"method": "getIssue", "params": {"id": 4}})).await;
    assert_eq!(issue["publicationDate"], "2024-01-01");
    assert_eq!(issue["cutoffDate"], "2023-12-20");
    assert_eq!(issue["generalMessages"], json!([]));
}
