//! # distill-rs
//!
//! Resilient content summarization pipeline: discovers pending work items in
//! a remote tracking store, fetches their content through a budgeted rate
//! governor, generates summaries behind a circuit breaker, and archives the
//! results with a local fallback when the remote write fails.

pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod governor;
pub mod model;
pub mod orchestrator;
pub mod processor;
pub mod source;
pub mod state;
pub mod summarizer;
pub mod telemetry;
pub mod tracker;
pub mod wrapper;
