//! SQL migration definitions for the SiteBot database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its version in `schema_migrations` as its last statement.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: conversation_context",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per website mentioned in a conversation
CREATE TABLE IF NOT EXISTS conversation_context (
    id              TEXT PRIMARY KEY,
    conversation_id INTEGER NOT NULL,
    website         TEXT NOT NULL,
    enriched_text   TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    UNIQUE(conversation_id, website)
);

CREATE INDEX IF NOT EXISTS idx_context_conversation_created
    ON conversation_context(conversation_id, created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
