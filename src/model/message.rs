//! Tagged issue messages.
//!
//! Only amendments are interpreted. Every other message kind is carried as an
//! opaque JSON object and written back exactly as it was read.

use crate::types::{DatasetId, PublicationId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Tag value identifying amendment messages.
pub const AMENDMENT_TAG: &str = "amendment";

/// Per-dataset change record carried by an amendment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetChange {
    #[serde(default)]
    pub contents: Vec<Value>,
}

/// An edit targeting a previously annexed publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendmentMessage {
    pub target: PublicationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_changes: Option<BTreeMap<DatasetId, DatasetChange>>,

    /// Keys this crate does not interpret (text, locale blocks, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AmendmentMessage {
    pub fn new(target: PublicationId) -> Self {
        Self {
            target,
            dataset_changes: None,
            extra: Map::new(),
        }
    }

    pub fn with_changes(mut self, dataset: DatasetId, contents: Vec<Value>) -> Self {
        self.dataset_changes
            .get_or_insert_with(BTreeMap::new)
            .insert(dataset, DatasetChange { contents });
        self
    }

    pub fn changes_for(&self, dataset: &DatasetId) -> Option<&DatasetChange> {
        self.dataset_changes.as_ref().and_then(|c| c.get(dataset))
    }
}

/// A message in one of an issue's message blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Message {
    Amendment(AmendmentMessage),
    /// Any other kind, preserved byte-for-byte at the JSON level.
    Opaque(Map<String, Value>),
}

impl Message {
    pub fn as_amendment(&self) -> Option<&AmendmentMessage> {
        match self {
            Message::Amendment(amendment) => Some(amendment),
            Message::Opaque(_) => None,
        }
    }

    /// The `type` tag, if any.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Message::Amendment(_) => Some(AMENDMENT_TAG),
            Message::Opaque(map) => map.get("type").and_then(Value::as_str),
        }
    }
}

impl TryFrom<Value> for Message {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut map) = value else {
            return Err(format!("message must be an object, got {}", value));
        };
        if map.get("type").and_then(Value::as_str) == Some(AMENDMENT_TAG) {
            map.remove("type");
            let amendment: AmendmentMessage = serde_json::from_value(Value::Object(map))
                .map_err(|e| format!("invalid amendment message: {}", e))?;
            Ok(Message::Amendment(amendment))
        } else {
            Ok(Message::Opaque(map))
        }
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        match message {
            Message::Amendment(amendment) => {
                let mut value = serde_json::to_value(amendment).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("type".to_string(), Value::String(AMENDMENT_TAG.to_string()));
                }
                value
            }
            Message::Opaque(map) => Value::Object(map),
        }
    }
}
