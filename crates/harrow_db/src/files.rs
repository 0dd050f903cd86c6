//! File-registry operations (admission and delivery outbox).

use crate::error::{DbError, Result};
use crate::types::*;
use crate::CrawlDb;
use sqlx::Row;

impl CrawlDb {
    // ========================================================================
    // Crawl Registry
    // ========================================================================

    /// Get-or-create a crawl by its unique name (lowercased).
    pub async fn ensure_crawl(&self, name: &str) -> Result<Crawl> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(DbError::invalid_state("crawl name cannot be empty"));
        }

        sqlx::query(
            "INSERT INTO crawls (name, created_at) VALUES (?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(&name)
        .bind(Self::now())
        .execute(self.pool())
        .await?;

        let row = sqlx::query("SELECT id, name, created_at FROM crawls WHERE name = ?")
            .bind(&name)
            .fetch_one(self.pool())
            .await?;

        Ok(Crawl {
            id: row.get("id"),
            name: row.get("name"),
            created_at: row.get("created_at"),
        })
    }

    // ========================================================================
    // File Registry
    // ========================================================================

    /// Insert a file or, if `(crawl_id, fingerprint)` is already known,
    /// refresh only its non-identity fields (size, mime, paths). Content and
    /// classification fields of an existing row are never touched.
    ///
    /// The returned `inserted` flag is the admission gate: callers process
    /// content only when it is true.
    pub async fn upsert_file(
        &self,
        crawl_id: i64,
        file: &NewFile,
        payload: Option<&str>,
        delivered: bool,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO files (
                crawl_id, fingerprint, filename, extension, mime_type, file_size,
                created, last_accessed, last_modified, indexed_at,
                path_real, path_virtual, payload, delivered
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(crawl_id, fingerprint) DO NOTHING
            "#,
        )
        .bind(crawl_id)
        .bind(&file.fingerprint)
        .bind(&file.filename)
        .bind(&file.extension)
        .bind(&file.mime_type)
        .bind(file.file_size)
        .bind(file.created)
        .bind(file.last_accessed)
        .bind(file.last_modified)
        .bind(file.indexed_at)
        .bind(&file.path_real)
        .bind(&file.path_virtual)
        .bind(payload)
        .bind(delivered)
        .execute(&mut *tx)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            sqlx::query(
                r#"
                UPDATE files SET
                    file_size = ?,
                    mime_type = ?,
                    path_real = ?,
                    path_virtual = ?
                WHERE crawl_id = ? AND fingerprint = ?
                "#,
            )
            .bind(file.file_size)
            .bind(&file.mime_type)
            .bind(&file.path_real)
            .bind(&file.path_virtual)
            .bind(crawl_id)
            .bind(&file.fingerprint)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let record = self
            .get_file_by_fingerprint(crawl_id, &file.fingerprint)
            .await?
            .ok_or_else(|| {
                DbError::invalid_state(format!(
                    "no row for fingerprint {} after upsert",
                    file.fingerprint
                ))
            })?;

        Ok(UpsertOutcome { record, inserted })
    }

    /// Set or clear the delivery outbox for one file.
    pub async fn mark_outbox(
        &self,
        file_id: i64,
        payload: Option<&str>,
        delivered: bool,
    ) -> Result<()> {
        sqlx::query("UPDATE files SET payload = ?, delivered = ? WHERE id = ?")
            .bind(payload)
            .bind(delivered)
            .bind(file_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Ids of undelivered rows, oldest indexing timestamp first, capped at
    /// `limit` to bound selector memory.
    pub async fn pending_batch(&self, limit: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT id FROM files WHERE delivered = 0 ORDER BY indexed_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    pub async fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.as_ref().map(row_to_file))
    }

    pub async fn get_file_by_fingerprint(
        &self,
        crawl_id: i64,
        fingerprint: &str,
    ) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE crawl_id = ? AND fingerprint = ?")
            .bind(crawl_id)
            .bind(fingerprint)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.as_ref().map(row_to_file))
    }

    pub async fn count_files(&self, crawl_id: i64) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM files WHERE crawl_id = ?")
            .bind(crawl_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    pub async fn stats(&self, crawl_id: i64) -> Result<CrawlStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN delivered = 1 THEN 1 ELSE 0 END) AS delivered,
                SUM(CASE WHEN delivered = 0 THEN 1 ELSE 0 END) AS pending
            FROM files WHERE crawl_id = ?
            "#,
        )
        .bind(crawl_id)
        .fetch_one(self.pool())
        .await?;

        Ok(CrawlStats {
            total: row.get::<i64, _>("total") as u64,
            delivered: row.get::<Option<i64>, _>("delivered").unwrap_or(0) as u64,
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0) as u64,
        })
    }
}

fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        id: row.get("id"),
        crawl_id: row.get("crawl_id"),
        fingerprint: row.get("fingerprint"),
        filename: row.get("filename"),
        extension: row.get("extension"),
        mime_type: row.get("mime_type"),
        file_size: row.get("file_size"),
        created: row.get("created"),
        last_accessed: row.get("last_accessed"),
        last_modified: row.get("last_modified"),
        indexed_at: row.get("indexed_at"),
        path_real: row.get("path_real"),
        path_virtual: row.get("path_virtual"),
        payload: row.get("payload"),
        delivered: row.get("delivered"),
    }
}
