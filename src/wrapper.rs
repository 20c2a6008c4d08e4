//! Volatile-service call wrapper: circuit breaker + adaptive backoff.
//!
//! Wraps the generation dependency. The breaker stops new calls entirely
//! after repeated whole-call failures; the retry ladder absorbs transient
//! overload inside a single call. All sleeps are `tokio::time::sleep`, so a
//! paused-clock test or an outer driver can pass time without blocking a
//! thread.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::Metadata;
use crate::state::CircuitState;
use crate::summarizer::{GeneratedText, GenerationService};
use crate::telemetry::metrics;

/// Tuning for the call wrapper.
#[derive(Debug, Clone)]
pub struct WrapperConfig {
    /// Base proactive spacing before each call.
    pub base_delay: Duration,
    /// Extra spacing added per recorded breaker failure.
    pub failure_spacing: Duration,
    /// Breaker opens at this many consecutive whole-call failures.
    pub open_threshold: u32,
    /// How long an open breaker short-circuits calls.
    pub cooldown: Duration,
    /// First rung of the transient-retry ladder (doubles per attempt).
    pub retry_base: Duration,
    /// Attempts per call before declaring the service overloaded.
    pub max_attempts: u32,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            failure_spacing: Duration::from_secs(10),
            open_threshold: 3,
            cooldown: Duration::from_secs(300),
            retry_base: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

/// Circuit-broken, backoff-wrapped generation client.
///
/// Single caller: check-and-record on the breaker is not guarded.
pub struct ResilientGenerator<S> {
    service: S,
    config: WrapperConfig,
    circuit: CircuitState,
    last_call: Option<DateTime<Utc>>,
}

impl<S: GenerationService> ResilientGenerator<S> {
    pub fn new(service: S, config: WrapperConfig, circuit: CircuitState) -> Self {
        Self {
            service,
            config,
            circuit,
            last_call: None,
        }
    }

    /// Snapshot the breaker for persistence.
    pub fn circuit(&self) -> &CircuitState {
        &self.circuit
    }

    /// Tiny health probe, passed straight through. The probe is how we find
    /// out whether the breaker could close, so it must not be gated by it.
    pub async fn probe(&self) -> std::result::Result<(), crate::summarizer::GenerateError> {
        self.service.probe().await
    }

    /// Generate a summary, absorbing transient overload.
    ///
    /// Fails with [`Error::ServiceOverloaded`] when the breaker is open or
    /// the retry ladder is exhausted, [`Error::Service`] for non-retryable
    /// failures.
    pub async fn generate(&mut self, content: &str, metadata: &Metadata) -> Result<GeneratedText> {
        self.check_breaker()?;
        self.space_before_call().await;

        for attempt in 0..self.config.max_attempts {
            self.last_call = Some(Utc::now());
            match self.service.generate(content, metadata).await {
                Ok(text) => {
                    self.circuit.consecutive_failures = 0;
                    self.circuit.last_failure = None;
                    metrics::generation_tokens()
                        .add(text.input_tokens + text.output_tokens, &[]);
                    return Ok(text);
                }
                Err(e) if e.is_transient() => {
                    // 30, 60, 120, 240, 480, 960s
                    let wait = self.config.retry_base * 2u32.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.config.max_attempts,
                        wait_secs = wait.as_secs(),
                        "generation service overloaded, backing off: {e}"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(Error::Service(e.to_string())),
            }
        }

        self.circuit.consecutive_failures += 1;
        self.circuit.last_failure = Some(Utc::now());
        metrics::breaker_failures().add(1, &[]);
        warn!(
            failures = self.circuit.consecutive_failures,
            threshold = self.config.open_threshold,
            "generation call exhausted retries"
        );

        Err(Error::ServiceOverloaded(format!(
            "exhausted {} attempts",
            self.config.max_attempts
        )))
    }

    /// Short-circuit when the breaker is open; close it once the cooldown
    /// has elapsed.
    fn check_breaker(&mut self) -> Result<()> {
        if self.circuit.consecutive_failures < self.config.open_threshold {
            return Ok(());
        }
        let Some(last_failure) = self.circuit.last_failure else {
            return Ok(());
        };

        let elapsed = (Utc::now() - last_failure).to_std().unwrap_or_default();
        if elapsed < self.config.cooldown {
            let remaining = self.config.cooldown - elapsed;
            return Err(Error::ServiceOverloaded(format!(
                "circuit open, retry in {}s",
                remaining.as_secs()
            )));
        }

        info!("breaker cooldown expired, closing circuit");
        self.circuit.consecutive_failures = 0;
        self.circuit.last_failure = None;
        Ok(())
    }

    /// Proactive spacing: base delay plus 10s (configurable) per recorded
    /// failure, measured from the previous attempt.
    async fn space_before_call(&self) {
        let required = self.config.base_delay
            + self.config.failure_spacing * self.circuit.consecutive_failures;

        let elapsed = self
            .last_call
            .map(|last| (Utc::now() - last).to_std().unwrap_or_default())
            .unwrap_or(required);

        if elapsed < required {
            tokio::time::sleep(required - elapsed).await;
        }
    }
}
