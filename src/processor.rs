//! Item processor: the per-item state machine.
//!
//! Orchestrates one work item through claim, metadata fetch, governed
//! content fetch, generation, and artifact write, reconciling the local
//! ledger and the remote tracking store at every step. Generated content is
//! never silently lost: a failed remote artifact write falls back to a
//! local file and the item still completes.
//!
//! The claim (status -> Processing) is advisory: a read-then-write against
//! the remote store, not a compare-and-swap. Two schedulers running against
//! the same store could double-claim; run one instance.

use chrono::Utc;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, warn};

use crate::artifact::ArtifactWriter;
use crate::cache::{CacheStore, LedgerUpdate};
use crate::error::{Error, Result};
use crate::governor::{Admission, DenyReason, RateGovernor};
use crate::model::{ArtifactRef, ItemId, Metadata, Status, WorkItem};
use crate::source::{ContentSource, MetadataSource};
use crate::state::{PersistedState, StateStore};
use crate::summarizer::GenerationService;
use crate::telemetry::{metrics, record_status_transition, start_item_span};
use crate::tracker::{StatusFields, TrackingStore};
use crate::wrapper::ResilientGenerator;

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Reached Completed (remote or local-fallback artifact).
    Completed,
    /// Deferred by the rate governor; retried on a later pass.
    RateLimited,
    /// Terminal Error recorded in both stores.
    Failed,
    /// Already in a terminal status and no force flag; nothing done.
    Skipped,
}

pub struct ItemProcessor<S> {
    tracker: Arc<dyn TrackingStore>,
    metadata_source: Arc<dyn MetadataSource>,
    content_source: Arc<dyn ContentSource>,
    generator: ResilientGenerator<S>,
    governor: RateGovernor,
    cache: CacheStore,
    artifacts: ArtifactWriter,
    state: StateStore,
}

impl<S: GenerationService> ItemProcessor<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<dyn TrackingStore>,
        metadata_source: Arc<dyn MetadataSource>,
        content_source: Arc<dyn ContentSource>,
        generator: ResilientGenerator<S>,
        governor: RateGovernor,
        cache: CacheStore,
        artifacts: ArtifactWriter,
        state: StateStore,
    ) -> Self {
        Self {
            tracker,
            metadata_source,
            content_source,
            generator,
            governor,
            cache,
            artifacts,
            state,
        }
    }

    pub fn generator(&self) -> &ResilientGenerator<S> {
        &self.generator
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Process one item end to end.
    pub async fn process(&mut self, item: &WorkItem, force: bool) -> ProcessOutcome {
        // Idempotence: a terminal item without force is a no-op, checked
        // before any work happens.
        if item.status.is_terminal() && !force {
            info!(id = %item.id, status = %item.status, "already done, skipping");
            metrics::items_processed().add(1, &[KeyValue::new("outcome", "skipped")]);
            return ProcessOutcome::Skipped;
        }

        let span = start_item_span(item.id.as_str());
        let started = Instant::now();

        let outcome = async {
            if let Err(e) = self.claim(item, force).await {
                error!(id = %item.id, "claim failed: {e}");
                return ProcessOutcome::Failed;
            }

            match self.run_pipeline(item, force).await {
                Ok(artifact) => {
                    record_status_transition(&span, "processing", "completed");
                    if let ArtifactRef::Local(ref path) = artifact {
                        warn!(id = %item.id, path = %path.display(),
                              "completed with local-only artifact");
                    }
                    ProcessOutcome::Completed
                }
                Err(Error::RateLimited(reason)) => {
                    record_status_transition(&span, "processing", "rate_limited");
                    self.defer(item, &reason).await;
                    ProcessOutcome::RateLimited
                }
                Err(e) => {
                    record_status_transition(&span, "processing", "error");
                    self.fail(item, &e).await;
                    ProcessOutcome::Failed
                }
            }
        }
        .instrument(span.clone())
        .await;

        metrics::item_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        metrics::items_processed().add(
            1,
            &[KeyValue::new(
                "outcome",
                match outcome {
                    ProcessOutcome::Completed => "completed",
                    ProcessOutcome::RateLimited => "rate_limited",
                    ProcessOutcome::Failed => "failed",
                    ProcessOutcome::Skipped => "skipped",
                },
            )],
        );
        outcome
    }

    /// Claim the item by setting the remote status to Processing.
    ///
    /// An item found already in Processing (a crashed prior run) is
    /// re-claimed without a redundant write. Force bypasses the transition
    /// rules; otherwise an illegal transition is an error.
    async fn claim(&mut self, item: &WorkItem, force: bool) -> Result<()> {
        if item.status == Status::Processing {
            warn!(id = %item.id, "item was left in Processing, re-claiming");
            return Ok(());
        }
        if !force && !item.status.can_transition_to(Status::Processing) {
            return Err(Error::InvalidTransition {
                from: item.status.to_string(),
                to: Status::Processing.to_string(),
            });
        }
        self.tracker
            .set_status(&item.remote_id, Status::Processing, StatusFields::default())
            .await
    }

    async fn run_pipeline(&mut self, item: &WorkItem, force: bool) -> Result<ArtifactRef> {
        let metadata = self.metadata_source.fetch_item_metadata(&item.id).await?;

        let content = self.obtain_content(&item.id, &metadata, force).await?;

        let summary = {
            let result = self.generator.generate(&content, &metadata).await;
            // The breaker just moved; persist it before acting on the result.
            self.save_state();
            let summary = result?;
            self.cache.upsert(
                &item.id,
                LedgerUpdate {
                    summary_generated: Some(true),
                    ..Default::default()
                },
            )?;
            summary
        };
        info!(id = %item.id, model = %summary.model, "summary generated");

        let artifact = match self.tracker.create_artifact(&metadata, &summary.text).await {
            Ok(remote_ref) => ArtifactRef::Remote(remote_ref),
            Err(e) => {
                warn!(id = %item.id, "remote artifact write failed, writing local fallback: {e}");
                // Fallback writer succeeds or the failure is fatal for
                // this item; there is nothing below it.
                ArtifactRef::Local(self.artifacts.write_local(&metadata, &summary.text)?)
            }
        };
        self.cache.upsert(
            &item.id,
            LedgerUpdate {
                artifact_created: Some(true),
                last_error: Some(String::new()),
                ..Default::default()
            },
        )?;

        let artifact_ref = match &artifact {
            ArtifactRef::Remote(id) => id.clone(),
            ArtifactRef::Local(path) => path.display().to_string(),
        };
        self.tracker
            .set_status(
                &item.remote_id,
                Status::Completed,
                StatusFields {
                    title: Some(metadata.title.clone()),
                    channel: metadata.channel.clone(),
                    artifact_ref: Some(artifact_ref),
                    processed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(artifact)
    }

    /// Reuse ledgered content, or fetch through the rate governor.
    async fn obtain_content(
        &mut self,
        id: &ItemId,
        metadata: &Metadata,
        force: bool,
    ) -> Result<String> {
        // The ledger is always consulted before any governed fetch.
        let record = self.cache.get(id)?;
        if !force {
            if let Some(record) = &record {
                if record.content_fetched {
                    if let Some(cached) = &record.cached_content {
                        info!(%id, "using cached content");
                        return Ok(cached.clone());
                    }
                }
            }
        }

        match self.governor.check(Utc::now()) {
            Admission::Proceed => {}
            Admission::Wait(delay) => {
                info!(%id, wait_secs = delay.as_secs_f64(), "governor spacing wait");
                tokio::time::sleep(delay).await;
            }
            Admission::Deny(reason) => {
                metrics::governor_denials().add(
                    1,
                    &[KeyValue::new(
                        "reason",
                        match reason {
                            DenyReason::Backoff { .. } => "backoff",
                            DenyReason::DailyLimit { .. } => "daily",
                            DenyReason::HourlyLimit { .. } => "hourly",
                            DenyReason::SpacingTooLong { .. } => "spacing",
                        },
                    )],
                );
                return Err(Error::RateLimited(reason.to_string()));
            }
        }

        let fetched = self.content_source.fetch_raw_content(id).await;
        self.governor.record_outcome(fetched.is_ok(), Utc::now());
        self.save_state();
        let content = fetched?;

        self.cache.upsert(
            id,
            LedgerUpdate {
                title: Some(metadata.title.clone()),
                channel: metadata.channel.clone(),
                published_at: metadata.published_at,
                content_fetched: Some(true),
                cached_content: Some(content.clone()),
                ..Default::default()
            },
        )?;
        Ok(content)
    }

    /// Mark the item deferred in both stores. Not a failure.
    async fn defer(&mut self, item: &WorkItem, reason: &str) {
        info!(id = %item.id, reason, "deferred by rate governor");
        if let Err(e) = self.cache.upsert(
            &item.id,
            LedgerUpdate {
                last_error: Some(format!("rate limited: {reason}")),
                ..Default::default()
            },
        ) {
            warn!(id = %item.id, "ledger update failed while deferring: {e}");
        }
        if let Err(e) = self
            .tracker
            .set_status(
                &item.remote_id,
                Status::RateLimited,
                StatusFields {
                    error_message: Some(format!("Rate limited: {reason}")),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(id = %item.id, "remote status update failed while deferring: {e}");
        }
    }

    /// Record a terminal error, message captured verbatim in both stores.
    async fn fail(&mut self, item: &WorkItem, error: &Error) {
        let message = error.to_string();
        error!(id = %item.id, "processing failed: {message}");

        if let Err(e) = self.cache.upsert(
            &item.id,
            LedgerUpdate {
                last_error: Some(message.clone()),
                ..Default::default()
            },
        ) {
            warn!(id = %item.id, "ledger update failed while recording error: {e}");
        }
        if let Err(e) = self
            .tracker
            .set_status(
                &item.remote_id,
                Status::Error,
                StatusFields {
                    error_message: Some(message),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(id = %item.id, "remote status update failed while recording error: {e}");
        }
    }

    /// Persist governor + breaker state. Local-only; a failed save is
    /// logged, not fatal to the item.
    fn save_state(&self) {
        let snapshot = PersistedState {
            rate: self.governor.window().clone(),
            circuit: self.generator.circuit().clone(),
        };
        if let Err(e) = self.state.save(&snapshot) {
            warn!("state save failed: {e}");
        }
    }
}
