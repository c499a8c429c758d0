//! Issues: the chronologically numbered root unit of history.

use crate::model::dataset::Dataset;
use crate::model::message::{AmendmentMessage, Message};
use crate::store::{Document, FieldFile};
use crate::types::{DatasetId, IssueId, PublicationId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const GENERAL_MESSAGES: &str = "generalMessages";
pub const AMENDMENT_MESSAGES: &str = "amendmentMessages";
pub const ANNEXES: &str = "annexes";

/// Position recorded for a publication annexed at an issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnexedPosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_date: Option<NaiveDate>,

    /// `None` means no snapshot was annexed; `Some(empty)` is an empty snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasets: Option<BTreeMap<DatasetId, Dataset>>,
}

impl AnnexedPosition {
    pub fn at(position_date: NaiveDate) -> Self {
        Self {
            position_date: Some(position_date),
            datasets: None,
        }
    }

    pub fn dataset(&self, dataset: &DatasetId) -> Option<&Dataset> {
        self.datasets.as_ref().and_then(|d| d.get(dataset))
    }
}

/// Which message list of an issue an edit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageBlock {
    General,
    Amendment,
}

impl MessageBlock {
    pub fn field(self) -> &'static str {
        match self {
            MessageBlock::General => GENERAL_MESSAGES,
            MessageBlock::Amendment => AMENDMENT_MESSAGES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: IssueId,
    pub publication_date: NaiveDate,
    pub cutoff_date: NaiveDate,
    #[serde(default)]
    pub general_messages: Vec<Message>,
    #[serde(default)]
    pub amendment_messages: Vec<Message>,
    /// At most one entry per publication.
    #[serde(default)]
    pub annexes: BTreeMap<PublicationId, Option<AnnexedPosition>>,
}

impl Issue {
    /// Skeleton produced by scheduling: no messages, no annexes.
    pub fn scheduled(id: IssueId, publication_date: NaiveDate, cutoff_date: NaiveDate) -> Self {
        Self {
            id,
            publication_date,
            cutoff_date,
            general_messages: Vec::new(),
            amendment_messages: Vec::new(),
            annexes: BTreeMap::new(),
        }
    }

    pub fn messages(&self, block: MessageBlock) -> &Vec<Message> {
        match block {
            MessageBlock::General => &self.general_messages,
            MessageBlock::Amendment => &self.amendment_messages,
        }
    }

    pub fn messages_mut(&mut self, block: MessageBlock) -> &mut Vec<Message> {
        match block {
            MessageBlock::General => &mut self.general_messages,
            MessageBlock::Amendment => &mut self.amendment_messages,
        }
    }

    /// Amendments in message order. Non-amendment entries in the block are skipped.
    pub fn amendments(&self) -> impl Iterator<Item = &AmendmentMessage> {
        self.amendment_messages
            .iter()
            .filter_map(Message::as_amendment)
    }

    pub fn amendments_targeting<'a>(
        &'a self,
        publication: &'a PublicationId,
    ) -> impl Iterator<Item = &'a AmendmentMessage> + 'a {
        self.amendments().filter(move |a| &a.target == publication)
    }
}

impl Document for Issue {
    type Id = IssueId;

    const COLLECTION: &'static str = "issues";
    const STRUCTURED_FIELDS: &'static [FieldFile] = &[
        FieldFile::new(GENERAL_MESSAGES, "general-messages.json"),
        FieldFile::new(AMENDMENT_MESSAGES, "amendment-messages.json"),
        FieldFile::new(ANNEXES, "annexes.json"),
    ];
    const HISTORY_FIELDS: &'static [&'static str] = &[ANNEXES];

    fn id(&self) -> IssueId {
        self.id
    }

    fn post_load(id: &IssueId, raw: &mut Map<String, Value>) {
        raw.entry("id").or_insert_with(|| Value::from(id.as_u64()));

        for field in [GENERAL_MESSAGES, AMENDMENT_MESSAGES] {
            let repaired = match raw.remove(field) {
                None | Some(Value::Null) => Value::Array(Vec::new()),
                // Older writers wrapped blocks as { "messages": [...] }.
                Some(Value::Object(mut wrapper)) => match wrapper.remove("messages") {
                    Some(Value::Array(items)) => Value::Array(items),
                    _ => Value::Array(Vec::new()),
                },
                Some(Value::Array(items)) => {
                    Value::Array(items.into_iter().filter(Value::is_object).collect())
                }
                Some(_) => Value::Array(Vec::new()),
            };
            raw.insert(field.to_string(), repaired);
        }

        let annexes = match raw.remove(ANNEXES) {
            None | Some(Value::Null) => Value::Object(Map::new()),
            // Legacy: bare list of annexed publication IDs.
            Some(Value::Array(ids)) => Value::Object(
                ids.into_iter()
                    .filter_map(|id| id.as_str().map(|s| (s.to_string(), Value::Null)))
                    .collect(),
            ),
            Some(Value::Object(entries)) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| if v.is_object() { (k, v) } else { (k, Value::Null) })
                    .collect(),
            ),
            Some(_) => Value::Object(Map::new()),
        };
        raw.insert(ANNEXES.to_string(), annexes);
    }
}
