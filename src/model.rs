//! Core data model.
//!
//! A work item is one piece of external content to be summarized end-to-end.
//! It has identity (the id extracted from its source URL), a remote tracking
//! record, and a lifecycle status that only moves toward a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of content tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Content id, extracted from the source URL. Opaque to the pipeline.
    pub id: ItemId,

    /// Where the content lives. A container URL (one carrying a `list=`
    /// parameter) points at many items and is expanded, never processed.
    pub source_url: String,

    pub title: Option<String>,
    pub channel: Option<String>,
    pub published_at: Option<DateTime<Utc>>,

    /// Current lifecycle status.
    pub status: Status,

    /// Last error message, mirrored into the remote record.
    pub error_message: Option<String>,

    /// Id of the record in the remote tracking store.
    pub remote_id: RecordId,

    /// Where the generated summary ended up, once one exists.
    pub artifact: Option<ArtifactRef>,
}

impl WorkItem {
    /// Does this record point at a container of items rather than one item?
    pub fn is_container(&self) -> bool {
        is_container_url(&self.source_url)
    }
}

/// Newtype for content item ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for remote tracking record ids. Assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a written summary artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactRef {
    /// Page/record id in the remote store.
    Remote(String),
    /// Local fallback file, written when the remote write failed.
    Local(PathBuf),
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
///
/// An empty/unset status field in the remote store reads as `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Discovered, not yet claimed.
    New,
    /// Claimed by a processor run.
    Processing,
    /// Summary generated and artifact written. Terminal.
    Completed,
    /// Processing failed. Terminal (until force-reprocessed).
    Error,
    /// Deferred: the rate governor denied the fetch. Picked up next pass.
    RateLimited,
    /// Container reference expanded into member items. Terminal.
    ContainerExpanded,
}

impl Status {
    /// Can transition from self to `to`? Force-reprocess is the only
    /// override of these rules and is handled explicitly by the processor.
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (New, Processing)
                | (New, ContainerExpanded)
                | (New, Error)              // container expansion failure
                | (Processing, Completed)
                | (Processing, Error)
                | (Processing, RateLimited)
                | (RateLimited, Processing) // deferred work retried
                | (Error, Processing)       // re-discovered on a later pass
        )
    }

    /// Is this a terminal status? RateLimited is deferred, not terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::ContainerExpanded)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::New => "New",
            Status::Processing => "Processing",
            Status::Completed => "Completed",
            Status::Error => "Error",
            Status::RateLimited => "Rate Limited",
            Status::ContainerExpanded => "Container Expanded",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            // Empty/unset means never seen by the pipeline.
            "" | "New" => Ok(Status::New),
            "Processing" => Ok(Status::Processing),
            "Completed" => Ok(Status::Completed),
            "Error" => Ok(Status::Error),
            "Rate Limited" => Ok(Status::RateLimited),
            "Container Expanded" => Ok(Status::ContainerExpanded),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Canonical item metadata from the metadata source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub id: ItemId,
    pub title: String,
    pub channel: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub source_url: String,
}

/// A member discovered while expanding a container reference.
#[derive(Debug, Clone)]
pub struct ContainerMember {
    pub id: ItemId,
    pub title: String,
    pub source_url: String,
}

// ---------------------------------------------------------------------------
// Idempotency ledger record
// ---------------------------------------------------------------------------

/// One row per item id in the local cache store. Sole source of truth for
/// whether expensive fetch work must be repeated.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyRecord {
    pub item_id: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content_fetched: bool,
    pub summary_generated: bool,
    pub artifact_created: bool,
    pub cached_content: Option<String>,
    pub last_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

/// Does this URL name a container of items (a `list=` member set)?
pub fn is_container_url(url: &str) -> bool {
    container_ref_from_url(url).is_some()
}

/// Extract the container reference from a URL, if present.
pub fn container_ref_from_url(url: &str) -> Option<String> {
    let re = regex_lite::Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").ok()?;
    re.captures(url).map(|c| c[1].to_string())
}

/// Extract an item id from a source URL.
///
/// Accepts the watch/short/embed URL shapes plus a bare id.
pub fn item_id_from_url(url: &str) -> Option<ItemId> {
    let patterns = [
        r"(?:youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]{11})",
        r"youtube\.com/embed/([A-Za-z0-9_-]{11})",
        r"^([A-Za-z0-9_-]{11})$",
    ];
    for pattern in patterns {
        let re = regex_lite::Regex::new(pattern).ok()?;
        if let Some(caps) = re.captures(url) {
            return Some(ItemId(caps[1].to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_extraction_handles_common_url_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
        ] {
            assert_eq!(
                item_id_from_url(url),
                Some(ItemId("dQw4w9WgXcQ".into())),
                "failed for {url}"
            );
        }
        assert_eq!(item_id_from_url("https://example.com/nothing"), None);
    }

    #[test]
    fn container_detection() {
        assert!(is_container_url(
            "https://www.youtube.com/playlist?list=PLU9jW31vWD03JHBlzrMdVmqDW"
        ));
        assert!(is_container_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLabc_123"
        ));
        assert!(!is_container_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
    }

    #[test]
    fn empty_status_reads_as_new() {
        assert_eq!("".parse::<Status>(), Ok(Status::New));
    }

    #[test]
    fn terminal_statuses_do_not_transition() {
        assert!(!Status::Completed.can_transition_to(Status::Processing));
        assert!(!Status::ContainerExpanded.can_transition_to(Status::Processing));
        assert!(Status::RateLimited.can_transition_to(Status::Processing));
    }
}
