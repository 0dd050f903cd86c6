//! Alert-registry operations.

use crate::error::Result;
use crate::types::AlertRecord;
use crate::CrawlDb;
use sqlx::Row;

impl CrawlDb {
    /// Record that a finding was surfaced. `(crawl_id, fingerprint)` is
    /// unique, so a finding alerts at most once per crawl; `inserted` tells
    /// the caller whether the notifier should actually fire.
    pub async fn insert_or_get_alert(
        &self,
        crawl_id: i64,
        file_fingerprint: &str,
        fingerprint: &str,
        payload: Option<&str>,
    ) -> Result<(AlertRecord, bool)> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (crawl_id, file_fingerprint, fingerprint, payload, sent)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(crawl_id, fingerprint) DO NOTHING
            "#,
        )
        .bind(crawl_id)
        .bind(file_fingerprint)
        .bind(fingerprint)
        .bind(payload)
        .execute(self.pool())
        .await?;

        let inserted = result.rows_affected() > 0;

        let row = sqlx::query("SELECT * FROM alerts WHERE crawl_id = ? AND fingerprint = ?")
            .bind(crawl_id)
            .bind(fingerprint)
            .fetch_one(self.pool())
            .await?;

        Ok((
            AlertRecord {
                id: row.get("id"),
                crawl_id: row.get("crawl_id"),
                file_fingerprint: row.get("file_fingerprint"),
                fingerprint: row.get("fingerprint"),
                payload: row.get("payload"),
                sent: row.get("sent"),
            },
            inserted,
        ))
    }

    /// Mark an alert as handed to the notifier.
    pub async fn mark_alert_sent(&self, alert_id: i64) -> Result<()> {
        sqlx::query("UPDATE alerts SET sent = 1, payload = NULL WHERE id = ?")
            .bind(alert_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
