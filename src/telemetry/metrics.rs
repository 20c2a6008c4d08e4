//! Metric instrument factories for distill-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"distill-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for distill-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("distill-rs")
}

/// Counter: items processed.
/// Labels: `outcome` ("completed" | "failed" | "rate_limited" | "skipped").
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("distill.items.processed")
        .with_description("Number of items processed, by outcome")
        .build()
}

/// Counter: rate governor denials.
/// Labels: `reason` ("backoff" | "daily" | "hourly" | "spacing").
pub fn governor_denials() -> Counter<u64> {
    meter()
        .u64_counter("distill.governor.denials")
        .with_description("Number of governed calls denied")
        .build()
}

/// Counter: whole-call failures recorded against the circuit breaker.
pub fn breaker_failures() -> Counter<u64> {
    meter()
        .u64_counter("distill.breaker.failures")
        .with_description("Generation calls that exhausted the retry budget")
        .build()
}

/// Counter: generation token usage (input + output).
pub fn generation_tokens() -> Counter<u64> {
    meter()
        .u64_counter("distill.generation.tokens")
        .with_description("Generation service token usage")
        .build()
}

/// Counter: container references expanded into member records.
pub fn containers_expanded() -> Counter<u64> {
    meter()
        .u64_counter("distill.containers.expanded")
        .with_description("Container references expanded")
        .build()
}

/// Histogram: per-item processing duration in milliseconds.
pub fn item_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("distill.item.duration_ms")
        .with_description("Item processing duration in milliseconds")
        .with_unit("ms")
        .build()
}
