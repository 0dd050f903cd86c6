//! Elasticsearch-compatible sink over plain HTTP.
//!
//! Documents are written with `PUT /{index}/_doc/{fingerprint}`, so
//! re-delivering a fingerprint overwrites the same document and stays
//! idempotent. Connectivity problems and 5xx responses are transient;
//! 4xx responses mean the document itself was rejected.

use super::{Sink, SinkError};
use crate::document::Document;
use async_trait::async_trait;
use harrow_pool::{retry, RetryPolicy};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Bound on any single sink call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Short in-call retry against connection blips; longer outages are the
/// selector's job.
const DELIVER_RETRY: RetryPolicy = RetryPolicy::linear(3, Duration::from_millis(500));

pub struct ElasticSink {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl ElasticSink {
    pub fn new(node_url: &str, index: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: node_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    fn classify(err: reqwest::Error) -> SinkError {
        // Anything that never reached the cluster is worth retrying.
        if err.is_timeout() || err.is_connect() || err.is_request() {
            SinkError::transient(err)
        } else {
            SinkError::fatal(err)
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: String) -> SinkError {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            SinkError::transient(format!("{status}: {body}"))
        } else {
            SinkError::fatal(format!("{status}: {body}"))
        }
    }

    fn index_mapping() -> serde_json::Value {
        json!({
            "settings": {
                "index": { "highlight.max_analyzed_offset": 10_000_000 }
            },
            "mappings": {
                "properties": {
                    "indexed_at": { "type": "date" },
                    "created": { "type": "date" },
                    "last_accessed": { "type": "date" },
                    "last_modified": { "type": "date" },
                    "fingerprint": { "type": "keyword" },
                    "filename": { "type": "text" },
                    "extension": { "type": "keyword" },
                    "mime_type": { "type": "keyword" },
                    "file_size": { "type": "long" },
                    "path_virtual": { "type": "text" },
                    "path_real": { "type": "text" },
                    "content": { "type": "text" },
                    "metadata": { "type": "text" },
                    "has_credential": { "type": "boolean" },
                    "parser": { "type": "keyword" },
                    "object_content": { "type": "text" },
                    "credentials": { "type": "flattened" }
                }
            }
        })
    }
}

#[async_trait]
impl Sink for ElasticSink {
    fn name(&self) -> &'static str {
        "elastic"
    }

    /// Create the index with its mapping if it does not exist yet.
    async fn prepare(&self, _crawl_name: &str) -> Result<(), SinkError> {
        let index_url = format!("{}/{}", self.base_url, self.index);

        let head = self
            .client
            .head(&index_url)
            .send()
            .await
            .map_err(Self::classify)?;
        if head.status().is_success() {
            debug!(index = %self.index, "index already exists");
            return Ok(());
        }

        let response = self
            .client
            .put(&index_url)
            .json(&Self::index_mapping())
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Another worker may have raced the creation.
            if !body.contains("resource_already_exists_exception") {
                return Err(Self::classify_status(status, body));
            }
        }

        info!(index = %self.index, "search index ready");
        Ok(())
    }

    async fn deliver(&self, document: &Document) -> Result<(), SinkError> {
        retry(DELIVER_RETRY, SinkError::is_transient, || {
            self.put_document(document)
        })
        .await
    }
}

impl ElasticSink {
    async fn put_document(&self, document: &Document) -> Result<(), SinkError> {
        let url = format!(
            "{}/{}/_doc/{}",
            self.base_url, self.index, document.fingerprint
        );

        let response = self
            .client
            .put(&url)
            .json(document)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        Ok(())
    }
}
