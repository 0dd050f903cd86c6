//! Ledger schema creation. All CREATE TABLE statements live here.

use crate::error::Result;
use crate::CrawlDb;
use tracing::debug;

impl CrawlDb {
    /// Ensure all tables and indexes exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(self.pool())
            .await?;

        // Crawl registry: one row per logical crawl target.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS crawls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        // File registry + delivery outbox. `payload` holds the serialized
        // document until the sink accepts it; `delivered` gates the selector.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_id INTEGER NOT NULL REFERENCES crawls(id),
                fingerprint TEXT NOT NULL,
                filename TEXT NOT NULL,
                extension TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                created TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                indexed_at TEXT NOT NULL,
                path_real TEXT NOT NULL,
                path_virtual TEXT NOT NULL,
                payload TEXT,
                delivered INTEGER NOT NULL DEFAULT 0,
                UNIQUE(crawl_id, fingerprint)
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Supports the selector's "undelivered, oldest first" scans.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_files_delivered_indexed_at
             ON files (delivered, indexed_at)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_fingerprint ON files (fingerprint)")
            .execute(self.pool())
            .await?;

        // Alert registry: one row per surfaced finding, same uniqueness
        // discipline as files.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_id INTEGER NOT NULL REFERENCES crawls(id),
                file_fingerprint TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                payload TEXT,
                sent INTEGER NOT NULL DEFAULT 0,
                UNIQUE(crawl_id, fingerprint)
            )"#,
        )
        .execute(self.pool())
        .await?;

        debug!("ledger schema verified");
        Ok(())
    }
}
