//! Properties of the amendment window

use chrono::NaiveDate;
use gazette::amendment::{dataset_changes, DatasetPatch};
use gazette::model::{AmendmentMessage, AnnexedPosition, Dataset, Issue, Message};
use gazette::types::{DatasetId, IssueId, PublicationId};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

/// Issue ids that annex the dataset, and issue ids that amend it.
fn history() -> impl Strategy<Value = (Vec<u64>, Vec<u64>)> {
    (
        prop::collection::vec(1u64..30, 0..3),
        prop::collection::vec(1u64..30, 0..8),
    )
}

fn build(annexed: &[u64], amended: &[u64]) -> BTreeMap<IssueId, Issue> {
    let base = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let publication = PublicationId::new("P");
    let dataset = DatasetId::new("main");
    let mut issues: BTreeMap<IssueId, Issue> = BTreeMap::new();

    for id in annexed {
        let issue = issues
            .entry(IssueId(*id))
            .or_insert_with(|| Issue::scheduled(IssueId(*id), base, base));
        let mut position = AnnexedPosition::at(base);
        position.datasets = Some(BTreeMap::from([(
            dataset.clone(),
            Dataset::list(Vec::new(), Vec::new()),
        )]));
        issue.annexes.insert(publication.clone(), Some(position));
    }
    for id in amended {
        let issue = issues
            .entry(IssueId(*id))
            .or_insert_with(|| Issue::scheduled(IssueId(*id), base, base));
        issue.amendment_messages.push(Message::Amendment(
            AmendmentMessage::new(publication.clone())
                .with_changes(dataset.clone(), vec![json!({"from": id})]),
        ));
    }
    issues
}

proptest! {
    #[test]
    fn prop_changes_come_from_the_open_window(
        (annexed, amended) in history(),
        target in 1u64..32,
    ) {
        let issues = build(&annexed, &amended);
        let publication = PublicationId::new("P");
        let patch = dataset_changes(&issues, &publication, IssueId(target), None);

        let latest = annexed.iter().copied().filter(|id| *id < target).max();
        match latest {
            None => prop_assert_eq!(patch, DatasetPatch::NoData),
            Some(annex) => {
                let mut expected: Vec<u64> = amended
                    .iter()
                    .copied()
                    .filter(|id| *id > annex && *id < target)
                    .collect();
                // Issue order, then message order within an issue.
                expected.sort();
                let changes = patch.changes().expect("annexed dataset yields changes");
                let contents = &changes[&DatasetId::new("main")].contents;
                let got: Vec<u64> = contents
                    .iter()
                    .map(|c| c["from"].as_u64().unwrap())
                    .collect();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
