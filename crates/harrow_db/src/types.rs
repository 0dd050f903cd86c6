//! Row types for the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logical crawl target, created once per unique lowercase name.
#[derive(Debug, Clone)]
pub struct Crawl {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Attributes of a discovered file, as supplied by the discoverer.
///
/// `fingerprint` is derived from the content hash plus the lowercase
/// filename and is the dedup key within a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFile {
    pub fingerprint: String,
    pub filename: String,
    pub extension: String,
    pub mime_type: String,
    pub file_size: i64,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub path_real: String,
    pub path_virtual: String,
}

/// One row of the file registry.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub crawl_id: i64,
    pub fingerprint: String,
    pub filename: String,
    pub extension: String,
    pub mime_type: String,
    pub file_size: i64,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub path_real: String,
    pub path_virtual: String,
    pub payload: Option<String>,
    pub delivered: bool,
}

/// Result of [`crate::CrawlDb::upsert_file`]. `inserted` is the sole
/// admission gate: false means the file is already known under this crawl
/// and its content must not be reprocessed.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: FileRecord,
    pub inserted: bool,
}

/// One row of the alert registry.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub id: i64,
    pub crawl_id: i64,
    pub file_fingerprint: String,
    pub fingerprint: String,
    pub payload: Option<String>,
    pub sent: bool,
}

/// Progress counters for one crawl.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlStats {
    pub total: u64,
    pub delivered: u64,
    pub pending: u64,
}
