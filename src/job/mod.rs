//! Batch job record, state machine and stream read loop
//!
//! - [`machine`] - applies classified events to one [`BatchJob`]
//! - `stream` - the single read loop feeding a machine from the response body

pub mod machine;
pub(crate) mod stream;

pub use machine::{JobMachine, MachineContext, Step};

use serde::Serialize;
use url::Url;

use crate::types::{ItemId, ItemRef, JobId, JobStatus, LogEntry};

/// Client-side record of one streaming playlist download
///
/// Only the job state machine writes to it; observers get clones via
/// [`PlaylistDownloader::snapshot`](crate::PlaylistDownloader::snapshot).
#[derive(Clone, Debug, Serialize)]
pub struct BatchJob {
    id: JobId,
    status: JobStatus,
    items: Vec<ItemRef>,
    log: Vec<LogEntry>,
    artifact: Option<Url>,
    failure: Option<String>,
}

impl BatchJob {
    pub(crate) fn new(id: JobId, items: Vec<ItemRef>) -> Self {
        Self {
            id,
            status: JobStatus::Running,
            items,
            log: Vec::new(),
            artifact: None,
            failure: None,
        }
    }

    /// Job id
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Current lifecycle status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Items in submission order
    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    /// Look up an item by id
    pub fn item(&self, id: &ItemId) -> Option<&ItemRef> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Append-only event log
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Resolved artifact location, set only on success
    pub fn artifact(&self) -> Option<&Url> {
        self.artifact.as_ref()
    }

    /// Failure reason, set only when Failed
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Number of items reported finished
    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|item| item.completed).count()
    }
}
