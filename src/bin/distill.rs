//! distill CLI — operator interface to the summarization pipeline.

use clap::{Parser, Subcommand};
use chrono::Utc;
use distill_rs::artifact::ArtifactWriter;
use distill_rs::cache::CacheStore;
use distill_rs::config::Config;
use distill_rs::governor::RateGovernor;
use distill_rs::orchestrator::{Orchestrator, RunOptions};
use distill_rs::processor::ItemProcessor;
use distill_rs::source::{HttpSource, SourceEndpoints};
use distill_rs::state::StateStore;
use distill_rs::summarizer::anthropic::AnthropicSummarizer;
use distill_rs::telemetry::{TelemetryConfig, init_telemetry};
use distill_rs::tracker::TrackingStore;
use distill_rs::tracker::notion::NotionTracker;
use distill_rs::wrapper::{ResilientGenerator, WrapperConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "distill", about = "Resilient content summarization pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process pending items (continuously unless --once)
    Run {
        /// Run one pass and exit
        #[arg(long)]
        once: bool,
        /// Minutes between passes (overrides CHECK_INTERVAL_HOURS)
        #[arg(long)]
        interval: Option<u64>,
        /// Reprocess items even when already completed
        #[arg(long)]
        force: bool,
        /// Per-pass item cap
        #[arg(long)]
        max_items: Option<usize>,
        /// Keep going after a terminal item failure
        #[arg(long)]
        no_fail_fast: bool,
        /// Skip the generation service probe before each pass
        #[arg(long)]
        skip_health_check: bool,
    },
    /// Create records for a container URL's members
    Ingest {
        /// Container URL to expand
        container_url: String,
        /// Create at most this many records
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// Show governor budgets, breaker state, and ledger summary
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Run {
            once,
            interval,
            force,
            max_items,
            no_fail_fast,
            skip_health_check,
        } => {
            let opts = RunOptions {
                force,
                max_items,
                fail_fast: !no_fail_fast,
                skip_health_check,
            };
            let interval = interval.map_or(config.check_interval, |m| Duration::from_secs(m * 60));
            cmd_run(config, opts, once, interval).await
        }
        Command::Ingest {
            container_url,
            max_items,
        } => cmd_ingest(config, container_url, max_items).await,
        Command::Status => cmd_status(config),
    }
}

async fn cmd_run(
    config: Config,
    opts: RunOptions,
    once: bool,
    interval: Duration,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "distill".to_string(),
    })?;

    let mut orchestrator = build_orchestrator(&config)?;

    if once {
        let stats = orchestrator.run_once(&opts).await?;
        println!(
            "processed {} | errors {} | rate limited {} | skipped {} | expanded {} | deferred {}",
            stats.processed,
            stats.errors,
            stats.rate_limited,
            stats.skipped,
            stats.expanded,
            stats.deferred
        );
        return Ok(());
    }

    let shutdown = Arc::new(Notify::new());
    let notifier = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        notifier.notify_one();
    });

    orchestrator.run_forever(interval, opts, shutdown).await?;
    Ok(())
}

async fn cmd_ingest(
    config: Config,
    container_url: String,
    max_items: Option<usize>,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: None,
        service_name: "distill".to_string(),
    })?;

    let mut orchestrator = build_orchestrator(&config)?;
    let created = orchestrator.ingest(&container_url, max_items).await?;
    println!("created {created} record(s)");
    Ok(())
}

/// Local-only status report: persisted governor window, breaker state,
/// and ledger counts. No network calls.
fn cmd_status(config: Config) -> anyhow::Result<()> {
    let state = StateStore::new(&config.state_path).load();
    let mut governor = RateGovernor::new(config.governor.clone(), state.rate);
    let status = governor.status(Utc::now());

    println!(
        "Governor:   {}/{} this hour, {}/{} today",
        status.hourly_used, status.hourly_limit, status.daily_used, status.daily_limit
    );
    match status.backoff_remaining {
        Some(remaining) => println!(
            "Backoff:    {} consecutive failure(s), {}s remaining",
            status.consecutive_failures,
            remaining.as_secs()
        ),
        None => println!("Backoff:    none"),
    }

    println!(
        "Breaker:    {} consecutive failure(s){}",
        state.circuit.consecutive_failures,
        state
            .circuit
            .last_failure
            .map(|t| format!(", last at {t}"))
            .unwrap_or_default()
    );

    let cache = CacheStore::open(&config.ledger_path)?;
    println!("Ledger:     {} item(s) known", cache.known_ids()?.len());

    let artifacts = ArtifactWriter::new(&config.artifact_dir)?;
    println!("Artifacts:  {} local fallback file(s)", artifacts.list()?.len());
    Ok(())
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator<AnthropicSummarizer>> {
    let tracker: Arc<dyn TrackingStore> = Arc::new(NotionTracker::new(
        config.tracker_token.clone(),
        &config.tracker_database_id,
    )?);

    let source = Arc::new(HttpSource::new(SourceEndpoints {
        metadata_url: config.metadata_url.clone(),
        content_url: config.content_url.clone(),
        container_url: config.container_url.clone(),
    })?);

    let state = StateStore::new(&config.state_path);
    let persisted = state.load();

    let summarizer = AnthropicSummarizer::new(
        config.anthropic_api_key.clone(),
        config.generation_model.clone(),
    )?;
    let generator = ResilientGenerator::new(
        summarizer,
        WrapperConfig {
            base_delay: config.pacing.api_call_delay,
            ..Default::default()
        },
        persisted.circuit,
    );
    let governor = RateGovernor::new(config.governor.clone(), persisted.rate);

    let processor = ItemProcessor::new(
        tracker.clone(),
        source.clone(),
        source.clone(),
        generator,
        governor,
        CacheStore::open(&config.ledger_path)?,
        ArtifactWriter::new(&config.artifact_dir)?,
        state,
    );

    Ok(Orchestrator::new(
        processor,
        tracker,
        source,
        config.pacing.clone(),
    ))
}
