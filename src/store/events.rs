//! Index change notifications.
//!
//! The store publishes one event after every successful write, delete or reload.
//! Derived views (schedule, running-annex memo) subscribe instead of being
//! called from the persistence path.

use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Stored,
    Deleted,
    Reloaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexChanged {
    pub collection: &'static str,
    /// `None` for whole-collection reloads.
    pub id: Option<String>,
    pub kind: ChangeKind,
    /// Top-level fields written. Empty for deletes and reloads.
    pub fields: Vec<String>,
    /// Store generation after the change.
    pub generation: u64,
}

#[derive(Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<IndexChanged>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexChanged> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: IndexChanged) {
        let _ = self.sender.send(event);
    }
}
