//! Domain objects persisted by the document store.

pub mod dataset;
pub mod issue;
pub mod message;
pub mod publication;

pub use dataset::{Dataset, DatasetContents, DatasetSchema, DatasetShape, FieldDefinition};
pub use issue::{AnnexedPosition, Issue, MessageBlock};
pub use message::{AmendmentMessage, DatasetChange, Message};
pub use publication::Publication;

use crate::types::{IssueId, PublicationId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Derived view of one currently annexed publication. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningAnnex {
    pub publication_id: PublicationId,
    /// Issue where this annex was recorded.
    pub issue_id: IssueId,
    pub position_date: Option<NaiveDate>,
}
