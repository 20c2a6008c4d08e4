//! Item processor: the full per-item flow against fakes.

mod common;

use chrono::Utc;
use common::{FakeSource, FakeTracker, ScriptedGenerator, scratch_dir, work_item};
use distill_rs::artifact::ArtifactWriter;
use distill_rs::cache::{CacheStore, LedgerUpdate};
use distill_rs::config::GovernorConfig;
use distill_rs::governor::RateGovernor;
use distill_rs::model::{ItemId, Status};
use distill_rs::processor::{ItemProcessor, ProcessOutcome};
use distill_rs::state::{CircuitState, RateWindow, StateStore};
use distill_rs::wrapper::{ResilientGenerator, WrapperConfig};
use std::sync::Arc;
use std::sync::atomic::Ordering;

struct Harness {
    tracker: Arc<FakeTracker>,
    source: Arc<FakeSource>,
    generator: Arc<ScriptedGenerator>,
    processor: ItemProcessor<Arc<ScriptedGenerator>>,
}

fn harness(tag: &str) -> Harness {
    harness_with(
        tag,
        RateWindow::default(),
        CacheStore::in_memory().unwrap(),
        ScriptedGenerator::default(),
    )
}

fn harness_with(
    tag: &str,
    window: RateWindow,
    cache: CacheStore,
    generator: ScriptedGenerator,
) -> Harness {
    let dir = scratch_dir(tag);
    let tracker = Arc::new(FakeTracker::default());
    let source = Arc::new(FakeSource::default());
    let generator = Arc::new(generator);

    let processor = ItemProcessor::new(
        tracker.clone(),
        source.clone(),
        source.clone(),
        ResilientGenerator::new(
            generator.clone(),
            WrapperConfig::default(),
            CircuitState::default(),
        ),
        RateGovernor::new(GovernorConfig::default(), window),
        cache,
        ArtifactWriter::new(&dir).unwrap(),
        StateStore::new(dir.join("state.json")),
    );

    Harness {
        tracker,
        source,
        generator,
        processor,
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_completes_and_ledgers() {
    let mut h = harness("happy");
    let item = work_item("vid-1", Status::New);

    let outcome = h.processor.process(&item, false).await;
    assert_eq!(outcome, ProcessOutcome::Completed);

    // Claimed first, completed last.
    assert_eq!(
        h.tracker.statuses_for(&item.remote_id),
        vec![Status::Processing, Status::Completed]
    );
    let (_, fields) = h.tracker.last_status_for(&item.remote_id).unwrap();
    assert_eq!(fields.artifact_ref.as_deref(), Some("artifact-1"));
    assert!(fields.processed_at.is_some());

    assert_eq!(h.tracker.artifacts.lock().unwrap().len(), 1);
    assert_eq!(h.source.content_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);

    let record = h
        .processor
        .cache()
        .get(&ItemId("vid-1".to_string()))
        .unwrap()
        .unwrap();
    assert!(record.content_fetched);
    assert!(record.summary_generated);
    assert!(record.artifact_created);
    assert_eq!(record.cached_content.as_deref(), Some("the raw transcript text"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_defers_before_any_fetch() {
    let config = GovernorConfig::default();
    let window = RateWindow {
        recent: vec![Utc::now(); config.max_per_day],
        ..Default::default()
    };
    let mut h = harness_with(
        "budget",
        window,
        CacheStore::in_memory().unwrap(),
        ScriptedGenerator::default(),
    );
    let item = work_item("vid-2", Status::New);

    let outcome = h.processor.process(&item, false).await;
    assert_eq!(outcome, ProcessOutcome::RateLimited);

    // The governed fetch and everything past it never ran.
    assert_eq!(h.source.content_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);

    let (status, fields) = h.tracker.last_status_for(&item.remote_id).unwrap();
    assert_eq!(status, Status::RateLimited);
    assert!(fields.error_message.unwrap().contains("Rate limited"));
}

#[tokio::test(start_paused = true)]
async fn completed_item_is_skipped_without_force() {
    let mut h = harness("skip");
    let item = work_item("vid-3", Status::Completed);

    let outcome = h.processor.process(&item, false).await;
    assert_eq!(outcome, ProcessOutcome::Skipped);

    assert!(h.tracker.status_updates.lock().unwrap().is_empty());
    assert_eq!(h.source.metadata_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn force_reprocesses_a_completed_item() {
    let mut h = harness("force");
    let item = work_item("vid-4", Status::Completed);

    let outcome = h.processor.process(&item, true).await;
    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cached_content_skips_the_governed_fetch() {
    let mut cache = CacheStore::in_memory().unwrap();
    cache
        .upsert(
            &ItemId("vid-5".to_string()),
            LedgerUpdate {
                content_fetched: Some(true),
                cached_content: Some("previously fetched text".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let mut h = harness_with(
        "cached",
        RateWindow::default(),
        cache,
        ScriptedGenerator::default(),
    );
    let item = work_item("vid-5", Status::Error);

    let outcome = h.processor.process(&item, false).await;
    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(h.source.content_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_artifact_failure_falls_back_to_local() {
    let mut h = harness("fallback");
    h.tracker.fail_artifact.store(true, Ordering::SeqCst);
    let item = work_item("vid-6", Status::New);

    let outcome = h.processor.process(&item, false).await;
    // Content was generated; a remote write failure must not lose it.
    assert_eq!(outcome, ProcessOutcome::Completed);

    let (status, fields) = h.tracker.last_status_for(&item.remote_id).unwrap();
    assert_eq!(status, Status::Completed);
    let artifact_ref = fields.artifact_ref.unwrap();
    assert!(artifact_ref.ends_with(".md"), "got {artifact_ref}");

    let written = std::fs::read_to_string(&artifact_ref).unwrap();
    assert!(written.contains("Title vid-6"));
    assert!(written.contains("vid-6"));
    assert!(written.contains("https://www.youtube.com/watch?v=vid-6"));
    assert!(written.contains("A generated summary."));
}

#[tokio::test(start_paused = true)]
async fn missing_metadata_is_a_terminal_error() {
    let mut h = harness("missing");
    h.source.missing.store(true, Ordering::SeqCst);
    let item = work_item("vid-7", Status::New);

    let outcome = h.processor.process(&item, false).await;
    assert_eq!(outcome, ProcessOutcome::Failed);

    let (status, fields) = h.tracker.last_status_for(&item.remote_id).unwrap();
    assert_eq!(status, Status::Error);
    assert!(fields.error_message.unwrap().contains("not found"));

    let record = h
        .processor
        .cache()
        .get(&ItemId("vid-7".to_string()))
        .unwrap()
        .unwrap();
    assert!(record.last_error.unwrap().contains("not found"));
}

#[tokio::test(start_paused = true)]
async fn overloaded_service_exhausts_retries_and_errors_out() {
    use distill_rs::summarizer::GenerateErrorKind;

    let mut h = harness_with(
        "overloaded",
        RateWindow::default(),
        CacheStore::in_memory().unwrap(),
        ScriptedGenerator::failing(GenerateErrorKind::Overloaded, 6),
    );
    let item = work_item("vid-9", Status::New);

    let outcome = h.processor.process(&item, false).await;
    assert_eq!(outcome, ProcessOutcome::Failed);

    // One whole-call failure recorded on the breaker, terminal Error on
    // the record.
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 6);
    assert_eq!(h.processor.generator().circuit().consecutive_failures, 1);

    let (status, fields) = h.tracker.last_status_for(&item.remote_id).unwrap();
    assert_eq!(status, Status::Error);
    assert!(fields.error_message.unwrap().contains("overloaded"));
}

#[tokio::test(start_paused = true)]
async fn error_item_is_retried_on_a_later_pass() {
    let mut h = harness("retry");
    let item = work_item("vid-8", Status::Error);

    let outcome = h.processor.process(&item, false).await;
    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(
        h.tracker.statuses_for(&item.remote_id),
        vec![Status::Processing, Status::Completed]
    );
}
