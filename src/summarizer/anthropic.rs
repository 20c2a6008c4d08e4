//! Anthropic Messages API adapter.
//!
//! The only place where HTTP status codes get mapped to
//! [`GenerateErrorKind`]s. Everything above this module sees structured
//! error kinds.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{GenerateError, GenerateErrorKind, GeneratedText, GenerationService};
use crate::model::Metadata;

const API_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are an expert knowledge synthesizer. Produce a \
comprehensive analysis of the supplied content: why it matters and its strategic \
context, the key takeaways organized by theme with the specific details and \
examples mentioned, and actionable implementation guidance with any resources \
referenced. Be specific, detailed, and analytically rigorous.";

/// Anthropic-backed generation service.
pub struct AnthropicSummarizer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    api_base: String,
}

impl AnthropicSummarizer {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| GenerateError::new(GenerateErrorKind::Other, e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            api_base: "https://api.anthropic.com".to_string(),
        })
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn complete(
        &self,
        system: &str,
        prompt: String,
        max_tokens: u32,
    ) -> Result<GeneratedText, GenerateError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            temperature: 0.3,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::new(GenerateErrorKind::Network, e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GenerateError::new(classify_status(status), message));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::new(GenerateErrorKind::Other, e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        debug!(
            model = %parsed.model,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "completion received"
        );

        Ok(GeneratedText {
            text,
            model: parsed.model,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

/// Map an HTTP status to a structured error kind. 529 is Anthropic's
/// overloaded status; 500/503 behave the same way in practice.
fn classify_status(status: u16) -> GenerateErrorKind {
    match status {
        429 => GenerateErrorKind::RateLimited,
        500 | 503 | 529 => GenerateErrorKind::Overloaded,
        400 | 401 | 403 | 404 | 413 => GenerateErrorKind::InvalidRequest,
        _ => GenerateErrorKind::Other,
    }
}

#[async_trait]
impl GenerationService for AnthropicSummarizer {
    async fn generate(
        &self,
        content: &str,
        metadata: &Metadata,
    ) -> Result<GeneratedText, GenerateError> {
        let mut prompt = String::new();
        prompt.push_str("ITEM INFORMATION:\n");
        prompt.push_str(&format!("Title: {}\n", metadata.title));
        if let Some(ref channel) = metadata.channel {
            prompt.push_str(&format!("Channel: {channel}\n"));
        }
        prompt.push_str(&format!("URL: {}\n\nCONTENT:\n", metadata.source_url));
        prompt.push_str(content);

        self.complete(SYSTEM_PROMPT, prompt, 4096).await
    }

    async fn probe(&self) -> Result<(), GenerateError> {
        self.complete("Respond with: OK", "health check".to_string(), 16)
            .await
            .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
