//! Crawl ledger for Harrow.
//!
//! One sqlite database records everything a crawl has seen: a crawl registry,
//! a file registry keyed by `(crawl_id, fingerprint)`, and an alert registry.
//! The file registry doubles as a delivery outbox: rows carry a serialized
//! payload until the sink accepts them, so delivery survives crashes and sink
//! outages and is retried until it lands (at-least-once).
//!
//! Every pipeline worker owns its own [`CrawlDb`]; handles are never shared
//! across workers. Conflicting writes serialize on sqlite's single writer
//! plus the unique constraints.

mod alerts;
mod error;
mod files;
mod schema;
mod types;

pub use error::{DbError, Result};
pub use types::*;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Per-connection busy timeout; callers layer their own retry/backoff on top.
const BUSY_TIMEOUT: Duration = Duration::from_secs(15);

/// Ledger handle. One sqlite connection per handle, one handle per worker.
#[derive(Clone)]
pub struct CrawlDb {
    pool: SqlitePool,
    url: String,
}

impl CrawlDb {
    /// Open or create the ledger at `path`, creating the schema if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let db = Self {
            pool: Self::connect(&url).await?,
            url,
        };
        db.ensure_schema().await?;

        info!(path = %path.display(), "ledger opened");
        Ok(db)
    }

    /// Open an existing ledger (fails if the file does not exist). Used by
    /// pipeline workers, which must never race schema creation.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DbError::NotFound(format!(
                "ledger not found: {}",
                path.display()
            )));
        }

        let url = format!("sqlite:{}?mode=rw", path.display());
        Ok(Self {
            pool: Self::connect(&url).await?,
            url,
        })
    }

    async fn connect(url: &str) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        Ok(SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?)
    }

    /// Drop and re-establish the underlying connection. Called by workers
    /// after their retry budget against a wedged connection is exhausted.
    pub async fn reconnect(&mut self) -> Result<()> {
        debug!("recycling ledger connection");
        self.pool.close().await;
        self.pool = Self::connect(&self.url).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }
}
