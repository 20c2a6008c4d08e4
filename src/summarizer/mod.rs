//! Generation service abstraction.
//!
//! The pipeline talks to the summary generator through [`GenerationService`]
//! and classifies failures through [`GenerateErrorKind`], never by substring.
//! Status-code matching lives only in the concrete adapter, the true
//! external boundary.

pub mod anthropic;

use async_trait::async_trait;

use crate::model::Metadata;

/// A generated summary plus accounting.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Structured failure kind from the generation dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateErrorKind {
    /// Upstream overload (529 and friends). Retryable with backoff.
    Overloaded,
    /// Upstream rate limit (429). Retryable with backoff.
    RateLimited,
    /// Bad request, auth failure, oversized input. Not retryable.
    InvalidRequest,
    /// Transport-level failure.
    Network,
    /// Anything else.
    Other,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct GenerateError {
    pub kind: GenerateErrorKind,
    pub message: String,
}

impl GenerateError {
    pub fn new(kind: GenerateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Should the call wrapper retry this failure with backoff?
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            GenerateErrorKind::Overloaded | GenerateErrorKind::RateLimited
        )
    }
}

/// The volatile generation dependency, behind a seam so tests can fake it.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate a summary of `content` for the given item.
    async fn generate(
        &self,
        content: &str,
        metadata: &Metadata,
    ) -> Result<GeneratedText, GenerateError>;

    /// Tiny probe request used by the pre-batch health check.
    async fn probe(&self) -> Result<(), GenerateError>;
}

// Shared handles delegate, so callers can keep a reference to a service
// after handing it to the call wrapper.
#[async_trait]
impl<S: GenerationService + ?Sized> GenerationService for std::sync::Arc<S> {
    async fn generate(
        &self,
        content: &str,
        metadata: &Metadata,
    ) -> Result<GeneratedText, GenerateError> {
        (**self).generate(content, metadata).await
    }

    async fn probe(&self) -> Result<(), GenerateError> {
        (**self).probe().await
    }
}
