//! Publications: external references that issues annex.

use crate::store::{Document, FieldFile};
use crate::types::PublicationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Display metadata edited elsewhere.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Publication {
    pub fn new(id: impl Into<PublicationId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            extra: Map::new(),
        }
    }
}

impl Document for Publication {
    type Id = PublicationId;

    const COLLECTION: &'static str = "publications";
    const STRUCTURED_FIELDS: &'static [FieldFile] = &[];

    fn id(&self) -> PublicationId {
        self.id.clone()
    }

    fn post_load(id: &PublicationId, raw: &mut Map<String, Value>) {
        raw.entry("id")
            .or_insert_with(|| Value::String(id.as_str().to_string()));
    }
}
