//! libSQL storage layer for conversation context.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding one row per
//! `(conversation_id, website)` pair: the cleaned page text with its company
//! record appended, plus the time it was last refreshed.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use sitebot_shared::{ConversationContext, ConversationId, Result, SiteBotError};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SiteBotError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SiteBotError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SiteBotError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SiteBotError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Conversation context
    // -----------------------------------------------------------------------

    /// Insert or refresh the context for `(conversation_id, website)`.
    ///
    /// An existing row keeps its id; its text and timestamp are overwritten.
    pub async fn upsert_context(
        &self,
        conversation_id: ConversationId,
        website: &str,
        enriched_text: &str,
    ) -> Result<ConversationContext> {
        let now = format_timestamp(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO conversation_context (id, conversation_id, website, enriched_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(conversation_id, website) DO UPDATE SET
                   enriched_text = excluded.enriched_text,
                   created_at = excluded.created_at",
                params![
                    Uuid::now_v7().to_string(),
                    conversation_id.0,
                    website,
                    enriched_text,
                    now,
                ],
            )
            .await
            .map_err(|e| SiteBotError::Storage(e.to_string()))?;

        self.get_context(conversation_id, website)
            .await?
            .ok_or_else(|| {
                SiteBotError::Storage(format!(
                    "context for {conversation_id} / {website} missing after upsert"
                ))
            })
    }

    /// Get the context stored for one website in a conversation.
    pub async fn get_context(
        &self,
        conversation_id: ConversationId,
        website: &str,
    ) -> Result<Option<ConversationContext>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, conversation_id, website, enriched_text, created_at
                 FROM conversation_context WHERE conversation_id = ?1 AND website = ?2",
                params![conversation_id.0, website],
            )
            .await
            .map_err(|e| SiteBotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_context(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(SiteBotError::Storage(e.to_string())),
        }
    }

    /// Get the most recently refreshed context for a conversation.
    pub async fn get_latest_context(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationContext>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, conversation_id, website, enriched_text, created_at
                 FROM conversation_context WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![conversation_id.0],
            )
            .await
            .map_err(|e| SiteBotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_context(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(SiteBotError::Storage(e.to_string())),
        }
    }

    /// Number of stored contexts for a conversation.
    pub async fn count_contexts(&self, conversation_id: ConversationId) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM conversation_context WHERE conversation_id = ?1",
                params![conversation_id.0],
            )
            .await
            .map_err(|e| SiteBotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(|e| SiteBotError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(SiteBotError::Storage(e.to_string())),
        }
    }
}

/// Fixed-width UTC timestamp so lexical and chronological order agree.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Convert a database row to a [`ConversationContext`].
fn row_to_context(row: &libsql::Row) -> Result<ConversationContext> {
    Ok(ConversationContext {
        id: row
            .get::<String>(0)
            .map_err(|e| SiteBotError::Storage(e.to_string()))?,
        conversation_id: ConversationId(
            row.get::<i64>(1)
                .map_err(|e| SiteBotError::Storage(e.to_string()))?,
        ),
        website: row
            .get::<String>(2)
            .map_err(|e| SiteBotError::Storage(e.to_string()))?,
        enriched_text: row
            .get::<String>(3)
            .map_err(|e| SiteBotError::Storage(e.to_string()))?,
        created_at: {
            let s: String = row
                .get(4)
                .map_err(|e| SiteBotError::Storage(e.to_string()))?;
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SiteBotError::Storage(format!("invalid date: {e}")))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sb_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sb_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.schema_version().await, 1);
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let storage = test_storage().await;
        let conv = ConversationId(7);

        let saved = storage
            .upsert_context(conv, "https://example.com", "Acme text")
            .await
            .expect("upsert");
        assert_eq!(saved.conversation_id, conv);
        assert_eq!(saved.website, "https://example.com");
        assert_eq!(saved.enriched_text, "Acme text");

        let fetched = storage
            .get_context(conv, "https://example.com")
            .await
            .unwrap()
            .expect("row present");
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn same_url_twice_updates_one_row() {
        let storage = test_storage().await;
        let conv = ConversationId(1);

        let first = storage
            .upsert_context(conv, "https://example.com", "old")
            .await
            .unwrap();
        let second = storage
            .upsert_context(conv, "https://example.com", "new")
            .await
            .unwrap();

        assert_eq!(storage.count_contexts(conv).await.unwrap(), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.enriched_text, "new");
        assert!(second.created_at >= first.created_at);
    }

    #[tokio::test]
    async fn latest_context_is_most_recent_write() {
        let storage = test_storage().await;
        let conv = ConversationId(99);

        storage
            .upsert_context(conv, "https://a.example", "a")
            .await
            .unwrap();
        storage
            .upsert_context(conv, "https://b.example", "b")
            .await
            .unwrap();
        let latest = storage.get_latest_context(conv).await.unwrap().unwrap();
        assert_eq!(latest.website, "https://b.example");

        // refreshing an older site makes it the latest again
        storage
            .upsert_context(conv, "https://a.example", "a2")
            .await
            .unwrap();
        let latest = storage.get_latest_context(conv).await.unwrap().unwrap();
        assert_eq!(latest.website, "https://a.example");
        assert_eq!(latest.enriched_text, "a2");
        assert_eq!(storage.count_contexts(conv).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let storage = test_storage().await;
        storage
            .upsert_context(ConversationId(1), "https://example.com", "one")
            .await
            .unwrap();

        assert!(
            storage
                .get_latest_context(ConversationId(2))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(storage.count_contexts(ConversationId(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn negative_chat_ids_are_stored() {
        let storage = test_storage().await;
        let group = ConversationId(-1001234567890);
        storage
            .upsert_context(group, "https://example.com", "group chat")
            .await
            .unwrap();
        let latest = storage.get_latest_context(group).await.unwrap().unwrap();
        assert_eq!(latest.conversation_id, group);
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (fa, fb) = (format_timestamp(&a), format_timestamp(&b));
        assert_eq!(fa, "2024-01-02T03:04:05.000000Z");
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
    }
}
