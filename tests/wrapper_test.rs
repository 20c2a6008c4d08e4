//! Call wrapper behavior: retry ladder, circuit breaker, error mapping.
//!
//! Time-dependent tests run under tokio's paused clock so the multi-minute
//! retry ladder passes instantly.

mod common;

use common::{ScriptedGenerator, summary_text};
use distill_rs::error::Error;
use distill_rs::model::{ItemId, Metadata};
use distill_rs::state::CircuitState;
use distill_rs::summarizer::{GenerateError, GenerateErrorKind};
use distill_rs::wrapper::{ResilientGenerator, WrapperConfig};
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn metadata() -> Metadata {
    Metadata {
        id: ItemId("item-1".to_string()),
        title: "Title".to_string(),
        channel: None,
        published_at: None,
        description: None,
        source_url: "https://example.com/item-1".to_string(),
    }
}

fn config() -> WrapperConfig {
    WrapperConfig::default()
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let service = Arc::new(ScriptedGenerator::with_script(vec![
        Err(GenerateError::new(GenerateErrorKind::Overloaded, "529")),
        Err(GenerateError::new(GenerateErrorKind::RateLimited, "429")),
        Ok(summary_text()),
    ]));
    let mut wrapper = ResilientGenerator::new(service.clone(), config(), CircuitState::default());

    let result = wrapper.generate("content", &metadata()).await.unwrap();
    assert_eq!(result.text, "A generated summary.");
    assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    assert_eq!(wrapper.circuit().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_ladder_is_one_breaker_failure() {
    let service = Arc::new(ScriptedGenerator::failing(GenerateErrorKind::Overloaded, 6));
    let mut wrapper = ResilientGenerator::new(service.clone(), config(), CircuitState::default());

    let err = wrapper.generate("content", &metadata()).await.unwrap_err();
    assert!(matches!(err, Error::ServiceOverloaded(_)), "got {err:?}");

    // Six attempts inside the call count as one whole-call failure.
    assert_eq!(service.calls.load(Ordering::SeqCst), 6);
    assert_eq!(wrapper.circuit().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn non_transient_failure_is_not_retried() {
    let service = Arc::new(ScriptedGenerator::failing(
        GenerateErrorKind::InvalidRequest,
        1,
    ));
    let mut wrapper = ResilientGenerator::new(service.clone(), config(), CircuitState::default());

    let err = wrapper.generate("content", &metadata()).await.unwrap_err();
    assert!(matches!(err, Error::Service(_)), "got {err:?}");
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    // Input problems do not trip the breaker.
    assert_eq!(wrapper.circuit().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_short_circuits_without_calling_the_service() {
    let service = Arc::new(ScriptedGenerator::failing(GenerateErrorKind::Overloaded, 18));
    let mut wrapper = ResilientGenerator::new(service.clone(), config(), CircuitState::default());

    // Three whole-call failures open the breaker.
    for _ in 0..3 {
        let err = wrapper.generate("content", &metadata()).await.unwrap_err();
        assert!(matches!(err, Error::ServiceOverloaded(_)));
    }
    assert_eq!(wrapper.circuit().consecutive_failures, 3);
    let calls_so_far = service.calls.load(Ordering::SeqCst);

    // Next call fails immediately; the service never sees it.
    let err = wrapper.generate("content", &metadata()).await.unwrap_err();
    assert!(matches!(err, Error::ServiceOverloaded(_)));
    assert_eq!(service.calls.load(Ordering::SeqCst), calls_so_far);
}

#[tokio::test(start_paused = true)]
async fn probe_bypasses_an_open_breaker() {
    let service = Arc::new(ScriptedGenerator::default());
    let wrapper = ResilientGenerator::new(
        service.clone(),
        config(),
        CircuitState {
            consecutive_failures: 5,
            last_failure: Some(chrono::Utc::now()),
        },
    );

    wrapper.probe().await.unwrap();
    assert_eq!(service.probe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn success_closes_a_half_open_breaker() {
    // A breaker whose cooldown has already elapsed admits the next call.
    let service = Arc::new(ScriptedGenerator::default());
    let mut wrapper = ResilientGenerator::new(
        service.clone(),
        config(),
        CircuitState {
            consecutive_failures: 3,
            last_failure: Some(chrono::Utc::now() - chrono::Duration::minutes(10)),
        },
    );

    wrapper.generate("content", &metadata()).await.unwrap();
    assert_eq!(wrapper.circuit().consecutive_failures, 0);
    assert!(wrapper.circuit().last_failure.is_none());
}
