//! Consumed content interfaces: metadata, raw content, container members.
//!
//! The pipeline only ever sees these traits. The HTTP implementation here is
//! a thin adapter over configurable JSON endpoints; swap it out per
//! deployment without touching the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{ContainerMember, ItemId, Metadata};

/// Canonical metadata lookup.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch item metadata. `Error::NotFound` when the item does not exist.
    async fn fetch_item_metadata(&self, id: &ItemId) -> Result<Metadata>;

    /// List the members of a container reference.
    async fn list_container_members(&self, container_url: &str) -> Result<Vec<ContainerMember>>;
}

/// Raw content retrieval. Always gated by the rate governor before invocation.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the raw content body. `Error::NotFound` when unavailable.
    async fn fetch_raw_content(&self, id: &ItemId) -> Result<String>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Endpoint templates for [`HttpSource`]. `{id}` and `{container}` are
/// substituted per request.
#[derive(Debug, Clone)]
pub struct SourceEndpoints {
    pub metadata_url: String,
    pub content_url: String,
    pub container_url: String,
}

/// JSON-over-HTTP source adapter.
pub struct HttpSource {
    client: reqwest::Client,
    endpoints: SourceEndpoints,
}

impl HttpSource {
    pub fn new(endpoints: SourceEndpoints) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Other(format!("http client: {e}")))?;
        Ok(Self { client, endpoints })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!(url, "source fetch");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Other(format!("source request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(what.to_string()));
        }
        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "source returned {} for {what}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Other(format!("source response parse: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct MetadataPayload {
    id: String,
    title: String,
    channel: Option<String>,
    published_at: Option<DateTime<Utc>>,
    description: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    id: String,
    title: String,
    url: Option<String>,
}

#[async_trait]
impl MetadataSource for HttpSource {
    async fn fetch_item_metadata(&self, id: &ItemId) -> Result<Metadata> {
        let url = self.endpoints.metadata_url.replace("{id}", id.as_str());
        let payload: MetadataPayload = self.get_json(&url, id.as_str()).await?;
        Ok(Metadata {
            id: ItemId(payload.id),
            title: payload.title,
            channel: payload.channel,
            published_at: payload.published_at,
            description: payload.description,
            source_url: payload
                .url
                .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}")),
        })
    }

    async fn list_container_members(&self, container_url: &str) -> Result<Vec<ContainerMember>> {
        let container = crate::model::container_ref_from_url(container_url)
            .ok_or_else(|| Error::Other(format!("not a container URL: {container_url}")))?;
        let url = self.endpoints.container_url.replace("{container}", &container);
        let members: Vec<MemberPayload> = self.get_json(&url, &container).await?;
        Ok(members
            .into_iter()
            .map(|m| {
                let source_url = m
                    .url
                    .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", m.id));
                ContainerMember {
                    id: ItemId(m.id),
                    title: m.title,
                    source_url,
                }
            })
            .collect())
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn fetch_raw_content(&self, id: &ItemId) -> Result<String> {
        let url = self.endpoints.content_url.replace("{id}", id.as_str());
        let payload: ContentPayload = self.get_json(&url, id.as_str()).await?;
        Ok(payload.content)
    }
}
