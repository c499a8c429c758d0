//! Schema-described datasets annexed alongside a position.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Whether dataset contents are an ordered list or a keyed map of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetShape {
    List,
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSchema {
    pub shape: DatasetShape,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Record field used to address list records by key instead of position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetContents {
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl DatasetContents {
    pub fn len(&self) -> usize {
        match self {
            DatasetContents::List(items) => items.len(),
            DatasetContents::Map(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> DatasetShape {
        match self {
            DatasetContents::List(_) => DatasetShape::List,
            DatasetContents::Map(_) => DatasetShape::Map,
        }
    }
}

/// Immutable snapshot attached to one annexed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: DatasetSchema,
    pub contents: DatasetContents,
}

impl Dataset {
    pub fn list(schema_fields: Vec<FieldDefinition>, records: Vec<Value>) -> Self {
        Self {
            schema: DatasetSchema {
                shape: DatasetShape::List,
                fields: schema_fields,
                key_field: None,
            },
            contents: DatasetContents::List(records),
        }
    }

    pub fn map(schema_fields: Vec<FieldDefinition>, records: BTreeMap<String, Value>) -> Self {
        Self {
            schema: DatasetSchema {
                shape: DatasetShape::Map,
                fields: schema_fields,
                key_field: None,
            },
            contents: DatasetContents::Map(records),
        }
    }

    /// True when the contents match the shape declared by the schema.
    ///
    /// An empty JSON array or object deserializes as whichever variant comes
    /// first, so empty contents are accepted for both shapes.
    pub fn has_consistent_shape(&self) -> bool {
        self.contents.is_empty() || self.contents.shape() == self.schema.shape
    }
}
