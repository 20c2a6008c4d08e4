//! Notion database implementation of the tracking store.
//!
//! One database row per work item: Title (title), Source URL (url),
//! Item ID / Channel / Error / Artifact (rich_text), Status (select),
//! Processed Date (date). Summary artifacts are child pages of the record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use super::{NewRecord, StatusFields, TrackingStore};
use crate::error::{Error, Result};
use crate::model::{ItemId, Metadata, RecordId, Status, WorkItem, item_id_from_url};

const API_VERSION: &str = "2022-06-28";
/// Notion caps rich_text content at 2000 characters.
const TEXT_LIMIT: usize = 2000;

pub struct NotionTracker {
    client: reqwest::Client,
    token: SecretString,
    database_id: String,
    api_base: String,
}

impl NotionTracker {
    pub fn new(token: SecretString, database_id: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::RemoteStore(format!("http client: {e}")))?;
        Ok(Self {
            client,
            token,
            database_id: database_id.into(),
            api_base: "https://api.notion.com".to_string(),
        })
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.request(reqwest::Method::POST, path, Some(body)).await
    }

    async fn patch(&self, path: &str, body: Value) -> Result<Value> {
        self.request(reqwest::Method::PATCH, path, Some(body)).await
    }

    async fn request(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let mut req = self
            .client
            .request(method, format!("{}{path}", self.api_base))
            .bearer_auth(self.token.expose_secret())
            .header("Notion-Version", API_VERSION);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::RemoteStore(format!("request failed: {e}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::RemoteStore(format!("response parse: {e}")))?;

        if !status.is_success() {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(Error::RemoteStore(format!("{status}: {message}")));
        }
        Ok(payload)
    }

    /// Query the database, following pagination.
    async fn query(&self, filter: Value) -> Result<Vec<Value>> {
        let path = format!("/v1/databases/{}/query", self.database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": filter,
                "sorts": [{"timestamp": "created_time", "direction": "ascending"}],
            });
            if let Some(ref c) = cursor {
                body["start_cursor"] = json!(c);
            }

            let payload = self.post(&path, body).await?;
            if let Some(results) = payload.get("results").and_then(Value::as_array) {
                pages.extend(results.iter().cloned());
            }
            cursor = payload
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }
        Ok(pages)
    }

    fn parse_page(&self, page: &Value) -> Option<WorkItem> {
        let properties = page.get("properties")?;
        let remote_id = page.get("id").and_then(Value::as_str)?.to_string();

        let source_url = prop_url(properties, "Source URL")
            .or_else(|| prop_rich_text(properties, "Source URL"))?;

        // Prefer the stored Item ID; fall back to extracting from the URL.
        // Container records have no item id of their own.
        let id = prop_rich_text(properties, "Item ID")
            .map(ItemId)
            .or_else(|| item_id_from_url(&source_url))
            .unwrap_or_else(|| ItemId(source_url.clone()));

        let status = prop_select(properties, "Status")
            .unwrap_or_default()
            .parse::<Status>()
            .unwrap_or_else(|e| {
                warn!(%remote_id, "unparseable status, treating as New: {e}");
                Status::New
            });

        Some(WorkItem {
            id,
            source_url,
            title: prop_title(properties, "Title"),
            channel: prop_rich_text(properties, "Channel"),
            published_at: prop_date(properties, "Published"),
            status,
            error_message: prop_rich_text(properties, "Error"),
            remote_id: RecordId(remote_id),
            artifact: None,
        })
    }
}

#[async_trait]
impl TrackingStore for NotionTracker {
    async fn list_pending(&self) -> Result<Vec<WorkItem>> {
        // Everything not in a terminal status, plus rows where the status
        // select was never set (they read as New).
        let filter = json!({
            "and": [
                {"or": [
                    {"property": "Status", "select": {"does_not_equal": Status::Completed.to_string()}},
                    {"property": "Status", "select": {"is_empty": true}},
                ]},
                {"property": "Status", "select": {"does_not_equal": Status::ContainerExpanded.to_string()}},
            ]
        });
        let pages = self.query(filter).await?;
        let items: Vec<WorkItem> = pages.iter().filter_map(|p| self.parse_page(p)).collect();
        debug!(count = items.len(), "pending records");
        Ok(items)
    }

    async fn list_completed(&self) -> Result<Vec<WorkItem>> {
        let filter = json!({
            "property": "Status",
            "select": {"equals": Status::Completed.to_string()},
        });
        let pages = self.query(filter).await?;
        Ok(pages.iter().filter_map(|p| self.parse_page(p)).collect())
    }

    async fn set_status(&self, id: &RecordId, status: Status, fields: StatusFields) -> Result<()> {
        let mut properties = json!({
            "Status": {"select": {"name": status.to_string()}},
        });

        if let Some(title) = fields.title {
            properties["Title"] = json!({"title": [{"text": {"content": title}}]});
        }
        if let Some(channel) = fields.channel {
            properties["Channel"] = rich_text_value(&channel);
        }
        if let Some(error) = fields.error_message {
            properties["Error"] = rich_text_value(&error);
        }
        if let Some(artifact) = fields.artifact_ref {
            properties["Artifact"] = rich_text_value(&artifact);
        }
        if let Some(processed_at) = fields.processed_at {
            properties["Processed Date"] = json!({"date": {"start": processed_at.to_rfc3339()}});
        }

        self.patch(&format!("/v1/pages/{}", id.0), json!({"properties": properties}))
            .await?;
        debug!(record = %id, %status, "status updated");
        Ok(())
    }

    async fn create_record(&self, record: NewRecord) -> Result<RecordId> {
        let body = json!({
            "parent": {"type": "database_id", "database_id": self.database_id},
            "properties": {
                "Title": {"title": [{"text": {"content": record.title}}]},
                "Source URL": {"url": record.source_url},
                "Status": {"select": {"name": record.status.to_string()}},
            },
        });
        let payload = self.post("/v1/pages", body).await?;
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::RemoteStore("created page has no id".to_string()))?;
        Ok(RecordId(id.to_string()))
    }

    async fn create_artifact(&self, metadata: &Metadata, summary: &str) -> Result<String> {
        let mut children = vec![json!({
            "object": "block",
            "type": "callout",
            "callout": {
                "rich_text": [{"type": "text", "text": {"content": format!(
                    "Channel: {}\nSource: {}",
                    metadata.channel.as_deref().unwrap_or("Unknown"),
                    metadata.source_url,
                )}}],
                "icon": {"type": "emoji", "emoji": "📄"},
            },
        })];

        // Plain paragraph blocks, chunked to the rich_text limit.
        for chunk in chunk_text(summary, TEXT_LIMIT) {
            children.push(json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": {"rich_text": [{"type": "text", "text": {"content": chunk}}]},
            }));
        }

        let body = json!({
            "parent": {"type": "database_id", "database_id": self.database_id},
            "properties": {
                "Title": {"title": [{"text": {"content": format!("Summary: {}", metadata.title)}}]},
            },
            "children": children,
        });
        let payload = self.post("/v1/pages", body).await?;
        payload
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::RemoteStore("artifact page has no id".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Property helpers
// ---------------------------------------------------------------------------

fn rich_text_value(content: &str) -> Value {
    let content: String = content.chars().take(TEXT_LIMIT).collect();
    json!({"rich_text": [{"text": {"content": content}}]})
}

fn prop_url(properties: &Value, name: &str) -> Option<String> {
    properties
        .get(name)?
        .get("url")
        .and_then(Value::as_str)
        .map(String::from)
}

fn prop_title(properties: &Value, name: &str) -> Option<String> {
    let texts = properties.get(name)?.get("title")?.as_array()?;
    let joined: String = texts
        .iter()
        .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

fn prop_rich_text(properties: &Value, name: &str) -> Option<String> {
    let texts = properties.get(name)?.get("rich_text")?.as_array()?;
    let joined: String = texts
        .iter()
        .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

fn prop_select(properties: &Value, name: &str) -> Option<String> {
    properties
        .get(name)?
        .get("select")?
        .get("name")
        .and_then(Value::as_str)
        .map(String::from)
}

fn prop_date(properties: &Value, name: &str) -> Option<DateTime<Utc>> {
    let start = properties.get(name)?.get("date")?.get("start")?.as_str()?;
    start.parse().ok()
}

/// Split on char boundaries into chunks of at most `limit` characters.
fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|c| c.iter().collect())
        .collect()
}
