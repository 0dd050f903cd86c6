//! Local evidence store: one JSON file per credential-bearing document.

use super::{Sink, SinkError};
use crate::document::Document;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

pub struct LocalStoreSink {
    out_dir: PathBuf,
}

impl LocalStoreSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl Sink for LocalStoreSink {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prepare(&self, _crawl_name: &str) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(SinkError::transient)
    }

    async fn deliver(&self, document: &Document) -> Result<(), SinkError> {
        // Only leaks are evidence; everything else is accepted and dropped.
        if document.credentials.is_none() {
            return Ok(());
        }

        let payload = serde_json::to_vec_pretty(document).map_err(SinkError::fatal)?;
        let path = self.out_dir.join(format!("{}.json", document.fingerprint));
        // Overwriting the same fingerprint makes re-delivery idempotent.
        tokio::fs::write(&path, payload)
            .await
            .map_err(SinkError::transient)?;

        debug!(path = %path.display(), "evidence stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use harrow_db::NewFile;
    use tempfile::TempDir;

    fn doc(with_creds: bool) -> Document {
        let now = Utc::now();
        let file = NewFile {
            fingerprint: "fp-test".into(),
            filename: "a.txt".into(),
            extension: "txt".into(),
            mime_type: "text/plain".into(),
            file_size: 1,
            created: now,
            last_accessed: now,
            last_modified: now,
            indexed_at: now,
            path_real: "/tmp/a.txt".into(),
            path_virtual: "a.txt".into(),
        };
        let mut doc = Document::from_file(&file, "text");
        if with_creds {
            doc.has_credential = true;
            doc.credentials = Some(Default::default());
        }
        doc
    }

    #[tokio::test]
    async fn stores_only_credentialed_documents() {
        let dir = TempDir::new().unwrap();
        let sink = LocalStoreSink::new(dir.path());
        sink.prepare("t").await.unwrap();

        sink.deliver(&doc(false)).await.unwrap();
        assert!(!dir.path().join("fp-test.json").exists());

        sink.deliver(&doc(true)).await.unwrap();
        assert!(dir.path().join("fp-test.json").exists());

        // Re-delivery of the same fingerprint is idempotent.
        sink.deliver(&doc(true)).await.unwrap();
    }
}
