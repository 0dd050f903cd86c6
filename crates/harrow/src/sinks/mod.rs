//! Delivery sinks.
//!
//! A sink accepts processed documents and must be idempotent under
//! re-delivery of the same fingerprint: the pipeline guarantees
//! at-least-once, not exactly-once. Errors carry a retry classification:
//! transient failures leave the outbox row pending for the selector, fatal
//! failures are subject to the run's error tolerance.

mod elastic;
mod local;

pub use elastic::ElasticSink;
pub use local::LocalStoreSink;

use crate::document::Document;
use async_trait::async_trait;
use thiserror::Error;

/// Sink failure with retry classification.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Connectivity-shaped failure; safe to retry later without operator
    /// intervention.
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// The sink rejected the document itself; retrying cannot help.
    #[error("sink rejected document: {0}")]
    Fatal(String),
}

impl SinkError {
    pub fn transient(message: impl ToString) -> Self {
        Self::Transient(message.to_string())
    }

    pub fn fatal(message: impl ToString) -> Self {
        Self::Fatal(message.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time setup for a crawl (index creation, directory layout).
    async fn prepare(&self, crawl_name: &str) -> Result<(), SinkError> {
        let _ = crawl_name;
        Ok(())
    }

    /// Deliver one document. Must be idempotent per fingerprint.
    async fn deliver(&self, document: &Document) -> Result<(), SinkError>;
}
