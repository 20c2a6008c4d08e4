//! Batch orchestrator: discovery, container expansion, paced sequential
//! processing, and the continuous scheduling loop.
//!
//! One pass lists pending records, expands any container records into
//! individual item records, then walks the plain items in order with an
//! adaptive inter-item delay. Items run strictly sequentially; the pacing
//! and circuit state assume one in-flight generation at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::PacingConfig;
use crate::error::Result;
use crate::model::{Status, WorkItem};
use crate::processor::{ItemProcessor, ProcessOutcome};
use crate::source::MetadataSource;
use crate::summarizer::GenerationService;
use crate::telemetry::metrics;
use crate::tracker::{NewRecord, StatusFields, TrackingStore};

/// Per-pass knobs from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Reprocess items even when already completed or ledgered.
    pub force: bool,
    /// Override for the per-pass item cap.
    pub max_items: Option<usize>,
    /// Stop the pass after the first terminal item failure.
    pub fail_fast: bool,
    /// Skip the generation service probe before the pass.
    pub skip_health_check: bool,
}

/// Outcome accounting for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Items that reached Completed.
    pub processed: usize,
    /// Items that ended in Error.
    pub errors: usize,
    /// Items deferred by the rate governor.
    pub rate_limited: usize,
    /// Items skipped as already done.
    pub skipped: usize,
    /// Container records expanded.
    pub expanded: usize,
    /// Items left for a later pass by the per-pass cap or fail-fast.
    pub deferred: usize,
}

pub struct Orchestrator<S> {
    processor: ItemProcessor<S>,
    tracker: Arc<dyn TrackingStore>,
    metadata_source: Arc<dyn MetadataSource>,
    pacing: PacingConfig,
}

impl<S: GenerationService> Orchestrator<S> {
    pub fn new(
        processor: ItemProcessor<S>,
        tracker: Arc<dyn TrackingStore>,
        metadata_source: Arc<dyn MetadataSource>,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            processor,
            tracker,
            metadata_source,
            pacing,
        }
    }

    /// One full pass over the pending set.
    pub async fn run_once(&mut self, opts: &RunOptions) -> Result<RunStats> {
        let mut stats = RunStats::default();

        if !opts.skip_health_check {
            if let Err(e) = self.processor.generator().probe().await {
                // Overload means every generation this pass would fail too.
                // Anything else (bad key, network blip) surfaces per item.
                if e.is_transient() {
                    warn!("generation service unhealthy, skipping pass: {e}");
                    return Ok(stats);
                }
                warn!("health probe failed, continuing anyway: {e}");
            }
        }

        let pending = self.tracker.list_pending().await?;
        info!(pending = pending.len(), "pass started");

        let (containers, items): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(WorkItem::is_container);

        if !containers.is_empty() {
            let mut known = self.known_ids(&items).await?;
            for container in &containers {
                match self.expand_container(container, &mut known, None).await {
                    Ok(created) => {
                        stats.expanded += 1;
                        info!(id = %container.id, created, "container expanded");
                    }
                    Err(e) => {
                        error!(id = %container.id, "container expansion failed: {e}");
                        stats.errors += 1;
                        let fields = StatusFields {
                            error_message: Some(e.to_string()),
                            ..Default::default()
                        };
                        if let Err(e) = self
                            .tracker
                            .set_status(&container.remote_id, Status::Error, fields)
                            .await
                        {
                            warn!(id = %container.id, "failed to record expansion error: {e}");
                        }
                    }
                }
            }
        }

        let cap = opts.max_items.unwrap_or(self.pacing.max_items_per_run);
        if items.len() > cap {
            stats.deferred = items.len() - cap;
            info!(cap, deferred = stats.deferred, "capping pass");
        }

        for (i, item) in items.iter().take(cap).enumerate() {
            if i > 0 {
                let delay = self.inter_item_delay(stats.errors);
                info!(delay_secs = delay.as_secs(), "pausing between items");
                tokio::time::sleep(delay).await;
            }

            match self.processor.process(item, opts.force).await {
                ProcessOutcome::Completed => stats.processed += 1,
                ProcessOutcome::RateLimited => stats.rate_limited += 1,
                ProcessOutcome::Skipped => stats.skipped += 1,
                ProcessOutcome::Failed => {
                    stats.errors += 1;
                    if opts.fail_fast {
                        let remaining = cap.min(items.len()) - i - 1;
                        stats.deferred += remaining;
                        warn!(id = %item.id, remaining, "stopping pass after failure");
                        break;
                    }
                }
            }
        }

        info!(
            processed = stats.processed,
            errors = stats.errors,
            rate_limited = stats.rate_limited,
            skipped = stats.skipped,
            expanded = stats.expanded,
            deferred = stats.deferred,
            "pass finished"
        );
        Ok(stats)
    }

    /// Continuous mode: a pass, then sleep until the next interval or
    /// shutdown. A failed pass is logged and the loop keeps going.
    pub async fn run_forever(
        &mut self,
        interval: Duration,
        opts: RunOptions,
        shutdown: Arc<Notify>,
    ) -> Result<()> {
        loop {
            if let Err(e) = self.run_once(&opts).await {
                error!("pass failed: {e}");
            }

            info!(interval_secs = interval.as_secs(), "sleeping until next pass");
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("shutdown requested, stopping scheduler");
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One-shot ingestion: create records for a container's members without
    /// waiting for a tracked container record. Returns how many were created.
    pub async fn ingest(&mut self, container_url: &str, max_items: Option<usize>) -> Result<usize> {
        let pending = self.tracker.list_pending().await?;
        let mut known = self.known_ids(&pending).await?;

        let members = self
            .metadata_source
            .list_container_members(container_url)
            .await?;
        info!(members = members.len(), "container listed");

        let mut created = 0;
        for member in members {
            if let Some(cap) = max_items {
                if created >= cap {
                    break;
                }
            }
            if !known.insert(member.id.as_str().to_string()) {
                continue;
            }
            self.tracker
                .create_record(NewRecord {
                    title: member.title,
                    source_url: member.source_url,
                    status: Status::New,
                })
                .await?;
            created += 1;
        }
        info!(created, "ingestion finished");
        Ok(created)
    }

    /// Expand one tracked container record into item records.
    ///
    /// Members already known (pending or completed) are not recreated, so
    /// re-expanding a container is safe. The container record itself moves
    /// to Container Expanded exactly once, after its members are created.
    async fn expand_container(
        &mut self,
        container: &WorkItem,
        known: &mut HashSet<String>,
        max_items: Option<usize>,
    ) -> Result<usize> {
        let members = self
            .metadata_source
            .list_container_members(&container.source_url)
            .await?;

        let mut created = 0;
        for member in members {
            if let Some(cap) = max_items {
                if created >= cap {
                    break;
                }
            }
            if !known.insert(member.id.as_str().to_string()) {
                continue;
            }
            self.tracker
                .create_record(NewRecord {
                    title: member.title,
                    source_url: member.source_url,
                    status: Status::New,
                })
                .await?;
            created += 1;
        }

        self.tracker
            .set_status(
                &container.remote_id,
                Status::ContainerExpanded,
                StatusFields::default(),
            )
            .await?;
        metrics::containers_expanded().add(1, &[]);
        Ok(created)
    }

    /// Ids already present in the tracking store, pending and completed.
    async fn known_ids(&self, pending: &[WorkItem]) -> Result<HashSet<String>> {
        let mut known: HashSet<String> = pending
            .iter()
            .map(|item| item.id.as_str().to_string())
            .collect();
        for item in self.tracker.list_completed().await? {
            known.insert(item.id.as_str().to_string());
        }
        Ok(known)
    }

    fn inter_item_delay(&self, errors: usize) -> Duration {
        inter_item_delay(&self.pacing, errors)
    }
}

/// Delay between items, scaled by errors so far in the pass.
///
/// Base delay with no errors, then x2, x3, and from the third error on a
/// capped linear ramp.
fn inter_item_delay(pacing: &PacingConfig, errors: usize) -> Duration {
    let base = pacing.inter_item_delay;
    match errors {
        0 => base,
        1 => base * 2,
        2 => base * 3,
        n => std::cmp::min(
            base * 5 + pacing.error_backoff * n as u32,
            pacing.max_inter_item_delay,
        ),
    }
}
