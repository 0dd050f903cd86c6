//! The document shape delivered to sinks and persisted in the outbox.

use chrono::{DateTime, Utc};
use harrow_db::NewFile;
use harrow_rules::RuleFindings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One processed file, ready for delivery. Serialized as JSON into the
/// ledger's outbox column whenever the immediate delivery attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
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
    pub parser: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub has_credential: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BTreeMap<String, RuleFindings>>,
}

impl Document {
    pub fn from_file(file: &NewFile, parser: &str) -> Self {
        Self {
            fingerprint: file.fingerprint.clone(),
            filename: file.filename.clone(),
            extension: file.extension.clone(),
            mime_type: file.mime_type.clone(),
            file_size: file.file_size,
            created: file.created,
            last_accessed: file.last_accessed,
            last_modified: file.last_modified,
            indexed_at: file.indexed_at,
            path_real: file.path_real.clone(),
            path_virtual: file.path_virtual.clone(),
            parser: parser.to_string(),
            content: None,
            object_content: None,
            metadata: None,
            has_credential: false,
            credentials: None,
        }
    }

    /// Cap `content` at `limit` characters without splitting a char.
    pub fn truncate_content(&mut self, limit: usize) {
        if limit == 0 {
            return;
        }
        if let Some(content) = &mut self.content {
            if let Some((idx, _)) = content.char_indices().nth(limit) {
                content.truncate(idx);
            }
        }
    }
}
