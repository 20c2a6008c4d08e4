//! Shared fakes for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use distill_rs::error::{Error, Result};
use distill_rs::model::{
    ContainerMember, ItemId, Metadata, RecordId, Status, WorkItem,
};
use distill_rs::summarizer::{
    GenerateError, GenerateErrorKind, GeneratedText, GenerationService,
};
use distill_rs::tracker::{NewRecord, StatusFields, TrackingStore};
use distill_rs::source::{ContentSource, MetadataSource};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Unique-ish scratch directory per test.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("distill-test-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn work_item(id: &str, status: Status) -> WorkItem {
    WorkItem {
        id: ItemId(id.to_string()),
        source_url: format!("https://www.youtube.com/watch?v={id}"),
        title: Some(format!("Title {id}")),
        channel: Some("Test Channel".to_string()),
        published_at: None,
        status,
        error_message: None,
        remote_id: RecordId(format!("rec-{id}")),
        artifact: None,
    }
}

pub fn container_item(id: &str) -> WorkItem {
    let mut item = work_item(id, Status::New);
    item.source_url = format!("https://www.youtube.com/playlist?list={id}");
    item
}

// ---------------------------------------------------------------------------
// Tracking store fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTracker {
    pub pending: Mutex<Vec<WorkItem>>,
    pub completed: Mutex<Vec<WorkItem>>,
    /// Every set_status call, in order.
    pub status_updates: Mutex<Vec<(RecordId, Status, StatusFields)>>,
    pub created: Mutex<Vec<NewRecord>>,
    /// Remote artifacts written, as (title, summary).
    pub artifacts: Mutex<Vec<(String, String)>>,
    /// When set, create_artifact fails (exercises the local fallback).
    pub fail_artifact: AtomicBool,
    pub list_pending_calls: AtomicUsize,
}

impl FakeTracker {
    pub fn with_pending(items: Vec<WorkItem>) -> Self {
        Self {
            pending: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn last_status_for(&self, record: &RecordId) -> Option<(Status, StatusFields)> {
        self.status_updates
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _, _)| id == record)
            .map(|(_, status, fields)| (*status, fields.clone()))
    }

    pub fn statuses_for(&self, record: &RecordId) -> Vec<Status> {
        self.status_updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id == record)
            .map(|(_, status, _)| *status)
            .collect()
    }
}

#[async_trait]
impl TrackingStore for FakeTracker {
    async fn list_pending(&self) -> Result<Vec<WorkItem>> {
        self.list_pending_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn list_completed(&self) -> Result<Vec<WorkItem>> {
        Ok(self.completed.lock().unwrap().clone())
    }

    async fn set_status(&self, id: &RecordId, status: Status, fields: StatusFields) -> Result<()> {
        self.status_updates
            .lock()
            .unwrap()
            .push((id.clone(), status, fields));
        Ok(())
    }

    async fn create_record(&self, record: NewRecord) -> Result<RecordId> {
        let mut created = self.created.lock().unwrap();
        created.push(record);
        Ok(RecordId(format!("rec-new-{}", created.len())))
    }

    async fn create_artifact(&self, metadata: &Metadata, summary: &str) -> Result<String> {
        if self.fail_artifact.load(Ordering::SeqCst) {
            return Err(Error::RemoteStore("artifact write rejected".to_string()));
        }
        let mut artifacts = self.artifacts.lock().unwrap();
        artifacts.push((metadata.title.clone(), summary.to_string()));
        Ok(format!("artifact-{}", artifacts.len()))
    }
}

// ---------------------------------------------------------------------------
// Content/metadata source fake
// ---------------------------------------------------------------------------

pub struct FakeSource {
    pub content: String,
    pub members: Mutex<Vec<ContainerMember>>,
    /// When set, metadata lookups return NotFound.
    pub missing: AtomicBool,
    pub metadata_calls: AtomicUsize,
    pub content_calls: AtomicUsize,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            content: "the raw transcript text".to_string(),
            members: Mutex::new(Vec::new()),
            missing: AtomicBool::new(false),
            metadata_calls: AtomicUsize::new(0),
            content_calls: AtomicUsize::new(0),
        }
    }
}

pub fn member(id: &str) -> ContainerMember {
    ContainerMember {
        id: ItemId(id.to_string()),
        title: format!("Title {id}"),
        source_url: format!("https://www.youtube.com/watch?v={id}"),
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn fetch_item_metadata(&self, id: &ItemId) -> Result<Metadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.load(Ordering::SeqCst) {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(Metadata {
            id: id.clone(),
            title: format!("Title {id}"),
            channel: Some("Test Channel".to_string()),
            published_at: Some(Utc::now()),
            description: Some("A test item".to_string()),
            source_url: format!("https://www.youtube.com/watch?v={id}"),
        })
    }

    async fn list_container_members(&self, _container_url: &str) -> Result<Vec<ContainerMember>> {
        Ok(self.members.lock().unwrap().clone())
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch_raw_content(&self, _id: &ItemId) -> Result<String> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.content.clone())
    }
}

// ---------------------------------------------------------------------------
// Generation service fake
// ---------------------------------------------------------------------------

/// Replays a script of responses, then succeeds forever.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<std::result::Result<GeneratedText, GenerateError>>>,
    pub calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    /// When set, probe reports the service as overloaded.
    pub unhealthy: AtomicBool,
}

impl ScriptedGenerator {
    pub fn with_script(
        script: Vec<std::result::Result<GeneratedText, GenerateError>>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn failing(kind: GenerateErrorKind, times: usize) -> Self {
        let script = (0..times)
            .map(|_| Err(GenerateError::new(kind, "scripted failure")))
            .collect();
        Self::with_script(script)
    }
}

pub fn summary_text() -> GeneratedText {
    GeneratedText {
        text: "A generated summary.".to_string(),
        model: "test-model".to_string(),
        input_tokens: 100,
        output_tokens: 50,
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(
        &self,
        _content: &str,
        _metadata: &Metadata,
    ) -> std::result::Result<GeneratedText, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(summary_text()))
    }

    async fn probe(&self) -> std::result::Result<(), GenerateError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(GenerateError::new(
                GenerateErrorKind::Overloaded,
                "scripted unhealthy",
            ));
        }
        Ok(())
    }
}
