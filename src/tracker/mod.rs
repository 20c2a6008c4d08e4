//! Remote tracking store abstraction.
//!
//! The remote database of work item records: source of pending work and the
//! audit trail. Records are never deleted, only status-updated.

pub mod notion;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Metadata, RecordId, Status, WorkItem};

/// Fields written alongside a status update. All optional; only set fields
/// are touched on the remote record.
#[derive(Debug, Clone, Default)]
pub struct StatusFields {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub error_message: Option<String>,
    pub artifact_ref: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Fields for a newly discovered record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub title: String,
    pub source_url: String,
    pub status: Status,
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// All records not yet in a terminal status, oldest first.
    /// An empty/unset status field counts as pending (reads as `New`).
    async fn list_pending(&self) -> Result<Vec<WorkItem>>;

    /// All records in `Completed` status.
    async fn list_completed(&self) -> Result<Vec<WorkItem>>;

    /// Update a record's status plus any set fields.
    async fn set_status(&self, id: &RecordId, status: Status, fields: StatusFields) -> Result<()>;

    /// Create a new record. Returns its id.
    async fn create_record(&self, record: NewRecord) -> Result<RecordId>;

    /// Write the generated summary as a remote artifact, returning a
    /// reference to it. Failure here is recoverable via the fallback writer.
    async fn create_artifact(&self, metadata: &Metadata, summary: &str) -> Result<String>;
}
