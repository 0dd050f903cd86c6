//! Harrow: a crawl-detect-deliver pipeline for leaked credentials.
//!
//! The crawler walks a directory tree (and git history), records every file
//! in a sqlite ledger keyed by content fingerprint, scans textual content
//! with the rule engine, and delivers enriched documents to a sink. Delivery
//! is at-least-once: documents that cannot be delivered immediately are
//! persisted in the ledger's outbox and republished by a background selector
//! until the sink accepts them.

pub mod alerts;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod document;
pub mod parsers;
pub mod sinks;
