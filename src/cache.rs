//! Local cache store: the idempotency ledger.
//!
//! One SQLite row per item id, upserted by the processor as expensive work
//! completes. Consulted before every rate-governed fetch so that retries and
//! restarts never repeat work that already succeeded. WAL mode for
//! concurrent read access.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::model::{IdempotencyRecord, ItemId};

/// Ledger backend. Owns the SQLite connection.
pub struct CacheStore {
    conn: Connection,
}

/// Partial update for an upsert. Unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct LedgerUpdate {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content_fetched: Option<bool>,
    pub summary_generated: Option<bool>,
    pub artifact_created: Option<bool>,
    pub cached_content: Option<String>,
    pub last_error: Option<String>,
}

impl CacheStore {
    /// Open or create a ledger at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory ledger (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS processed_items (
                item_id           TEXT PRIMARY KEY,
                title             TEXT,
                channel           TEXT,
                published_at      TEXT,
                content_fetched   INTEGER NOT NULL DEFAULT 0,
                summary_generated INTEGER NOT NULL DEFAULT 0,
                artifact_created  INTEGER NOT NULL DEFAULT 0,
                cached_content    TEXT,
                last_error        TEXT,
                processed_at      TEXT
            );
            ",
        )?;
        Ok(())
    }

    /// Get the record for an item id, if one exists.
    pub fn get(&self, id: &ItemId) -> Result<Option<IdempotencyRecord>> {
        self.conn
            .query_row(
                "SELECT item_id, title, channel, published_at, content_fetched,
                        summary_generated, artifact_created, cached_content,
                        last_error, processed_at
                 FROM processed_items WHERE item_id = ?1",
                params![id.as_str()],
                row_to_record,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Insert or update the record for an item id. Only set fields change;
    /// `processed_at` is stamped on every upsert.
    pub fn upsert(&mut self, id: &ItemId, update: LedgerUpdate) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO processed_items (item_id, title, channel, published_at,
                content_fetched, summary_generated, artifact_created,
                cached_content, last_error, processed_at)
             VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 0), COALESCE(?6, 0), COALESCE(?7, 0), ?8, ?9, ?10)
             ON CONFLICT(item_id) DO UPDATE SET
                title             = COALESCE(?2, title),
                channel           = COALESCE(?3, channel),
                published_at      = COALESCE(?4, published_at),
                content_fetched   = COALESCE(?5, content_fetched),
                summary_generated = COALESCE(?6, summary_generated),
                artifact_created  = COALESCE(?7, artifact_created),
                cached_content    = COALESCE(?8, cached_content),
                last_error        = COALESCE(?9, last_error),
                processed_at      = ?10",
            params![
                id.as_str(),
                update.title,
                update.channel,
                update.published_at.map(|t| t.to_rfc3339()),
                update.content_fetched,
                update.summary_generated,
                update.artifact_created,
                update.cached_content,
                update.last_error,
                now,
            ],
        )?;
        Ok(())
    }

    /// All item ids present in the ledger.
    pub fn known_ids(&self) -> Result<Vec<ItemId>> {
        let mut stmt = self.conn.prepare("SELECT item_id FROM processed_items")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(ItemId).collect())
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<IdempotencyRecord> {
    Ok(IdempotencyRecord {
        item_id: row.get(0)?,
        title: row.get(1)?,
        channel: row.get(2)?,
        published_at: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| s.parse().ok()),
        content_fetched: row.get(4)?,
        summary_generated: row.get(5)?,
        artifact_created: row.get(6)?,
        cached_content: row.get(7)?,
        last_error: row.get(8)?,
        processed_at: row
            .get::<_, Option<String>>(9)?
            .and_then(|s| s.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_preserves_unset_fields() {
        let mut store = CacheStore::in_memory().unwrap();
        let id = ItemId("item-1".into());

        store
            .upsert(
                &id,
                LedgerUpdate {
                    content_fetched: Some(true),
                    cached_content: Some("the content".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        store
            .upsert(
                &id,
                LedgerUpdate {
                    summary_generated: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        let record = store.get(&id).unwrap().unwrap();
        assert!(record.content_fetched);
        assert!(record.summary_generated);
        assert_eq!(record.cached_content.as_deref(), Some("the content"));
        assert!(record.processed_at.is_some());
    }

    #[test]
    fn missing_item_is_none() {
        let store = CacheStore::in_memory().unwrap();
        let id = ItemId("ghost".into());
        assert!(store.get(&id).unwrap().is_none());
    }
}
