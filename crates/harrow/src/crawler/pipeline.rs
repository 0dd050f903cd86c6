//! Pipeline workers and background loops.
//!
//! Processing workers admit files through the ledger, parse and scan them,
//! and try one immediate delivery, falling back to the outbox. Delivery
//! workers drain outbox rows republished by the selector. Both worker kinds
//! own a private ledger handle.

use super::git::{GitBlob, GitHistory};
use super::item::{fingerprint, hash_bytes, mime_for_extension, virtual_path, CrawlItem, FileMeta};
use crate::alerts::AlerterSet;
use crate::config::Config;
use crate::document::Document;
use crate::parsers::ParserRegistry;
use crate::sinks::Sink;
use async_trait::async_trait;
use chrono::Utc;
use globset::GlobSet;
use harrow_db::{CrawlDb, DbError, NewFile};
use harrow_pool::{retry, CancelToken, PoolHandle, Processor, RetryPolicy, TaskError, WorkerPool};
use harrow_rules::RuleSet;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ledger contention budget; the connection is recycled when it runs out.
const DB_RETRY: RetryPolicy = RetryPolicy::linear(25, Duration::from_millis(500));

/// Outbox flips are small writes; a short budget is enough.
const OUTBOX_RETRY: RetryPolicy = RetryPolicy::linear(5, Duration::from_secs(1));

/// Progress counters shared across the run.
#[derive(Debug, Default)]
pub struct Counters {
    read: AtomicU64,
    skipped: AtomicU64,
    delivered: AtomicU64,
}

impl Counters {
    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
    fn inc_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Processing
// ============================================================================

pub(super) struct ProcessWorker {
    pub db_path: PathBuf,
    pub base: PathBuf,
    pub crawl_id: i64,
    pub crawl_name: String,
    pub config: Arc<Config>,
    pub excludes: GlobSet,
    pub rules: Arc<RuleSet>,
    pub parsers: Arc<ParserRegistry>,
    pub sink: Arc<dyn Sink>,
    pub alerters: Arc<AlerterSet>,
    pub counters: Arc<Counters>,
}

#[async_trait]
impl Processor for ProcessWorker {
    type Item = CrawlItem;
    type Resource = CrawlDb;

    async fn setup(&self, _worker: usize) -> anyhow::Result<CrawlDb> {
        Ok(CrawlDb::open_existing(&self.db_path).await?)
    }

    async fn process(
        &self,
        item: CrawlItem,
        db: &mut CrawlDb,
        pool: &PoolHandle,
    ) -> Result<(), TaskError> {
        match item {
            CrawlItem::File(meta) => self.process_file(meta, db).await,
            CrawlItem::GitRepo(path) => self.process_git(path, db, pool).await,
        }
    }
}

impl ProcessWorker {
    async fn process_file(&self, meta: FileMeta, db: &mut CrawlDb) -> Result<(), TaskError> {
        let general = &self.config.general;

        if let Some(max) = general.max_size {
            if meta.size > max {
                self.counters.inc_skipped();
                return Ok(());
            }
        }
        if self
            .excludes
            .is_match(meta.path.to_string_lossy().to_lowercase())
        {
            self.counters.inc_skipped();
            return Ok(());
        }

        self.counters.inc_read();

        let new_file = match meta.to_new_file() {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %meta.path.display(), error = %format!("{err:#}"), "cannot hash file");
                self.counters.inc_skipped();
                return Ok(());
            }
        };

        let Some(outcome) = self.admit(db, &new_file).await? else {
            return Ok(());
        };
        if !outcome.inserted {
            // Already known under this crawl: identity fields were
            // refreshed, content is not reprocessed.
            self.counters.inc_skipped();
            return Ok(());
        }

        let raw = match tokio::fs::read(&meta.path).await {
            Ok(raw) => raw,
            Err(err) => {
                // The file is recorded; only its content is lost to us.
                warn!(path = %meta.path.display(), error = %err, "cannot read file content");
                self.counters.inc_skipped();
                return Ok(());
            }
        };

        self.process_content(db, outcome.record.id, &new_file, &raw).await
    }

    async fn process_git(
        &self,
        git_dir: PathBuf,
        db: &mut CrawlDb,
        pool: &PoolHandle,
    ) -> Result<(), TaskError> {
        let general = &self.config.general;
        if !general.git_support {
            return Ok(());
        }

        let repo_root = git_dir.parent().unwrap_or(&git_dir).to_path_buf();
        let repo_virtual = virtual_path(&self.base, &repo_root);
        info!(repo = %repo_root.display(), "mining git history");

        let max_size = general.max_size;
        let history = GitHistory::new(&git_dir);
        let blobs = match tokio::task::spawn_blocking(move || history.blobs(max_size)).await {
            Ok(Ok(blobs)) => blobs,
            Ok(Err(err)) => {
                warn!(repo = %repo_root.display(), error = %format!("{err:#}"), "cannot read git history");
                return Ok(());
            }
            Err(err) => {
                warn!(repo = %repo_root.display(), error = %err, "git extraction aborted");
                return Ok(());
            }
        };

        for blob in blobs {
            if !pool.is_running() {
                break;
            }
            self.counters.inc_read();

            let new_file = blob_to_new_file(&blob, &repo_root, &repo_virtual);
            let Some(outcome) = self.admit(db, &new_file).await? else {
                continue;
            };
            if !outcome.inserted {
                self.counters.inc_skipped();
                continue;
            }
            self.process_content(db, outcome.record.id, &new_file, &blob.content)
                .await?;
        }

        Ok(())
    }

    /// Upsert through the retry/backoff policy, recycling the connection
    /// once if the budget runs dry. A row we cannot obtain at all is a
    /// ledger-integrity failure, escalated unless the run tolerates errors.
    async fn admit(
        &self,
        db: &mut CrawlDb,
        file: &NewFile,
    ) -> Result<Option<harrow_db::UpsertOutcome>, TaskError> {
        let first = {
            let db_ref: &CrawlDb = db;
            retry(DB_RETRY, DbError::is_busy, || {
                db_ref.upsert_file(self.crawl_id, file, None, true)
            })
            .await
        };

        let attempt = match first {
            Err(err) if err.is_busy() => {
                if let Err(err) = db.reconnect().await {
                    warn!(error = %err, "ledger reconnect failed");
                }
                let db_ref: &CrawlDb = db;
                retry(DB_RETRY, DbError::is_busy, || {
                    db_ref.upsert_file(self.crawl_id, file, None, true)
                })
                .await
            }
            other => other,
        };

        match attempt {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) if self.config.general.continue_on_error => {
                warn!(file = %file.path_virtual, error = %err, "cannot record file, skipping");
                self.counters.inc_skipped();
                Ok(None)
            }
            Err(err) => Err(TaskError::Shutdown(format!(
                "cannot record file {}: {err}",
                file.path_virtual
            ))),
        }
    }

    /// Parse, detect, alert, and attempt immediate delivery. The outbox
    /// write is deliberately the last step, so an interrupted worker leaves
    /// a row that is either untouched or fully consistent.
    async fn process_content(
        &self,
        db: &mut CrawlDb,
        file_id: i64,
        file: &NewFile,
        raw: &[u8],
    ) -> Result<(), TaskError> {
        let general = &self.config.general;

        let parser = self.parsers.for_file(&file.extension, &file.mime_type);
        let parsed = match parser.parse(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(file = %file.path_virtual, parser = parser.name(), error = %format!("{err:#}"),
                      "parse failed, file recorded without content");
                self.counters.inc_skipped();
                return Ok(());
            }
        };

        let mut document = Document::from_file(file, parser.name());
        document.content = parsed.content.map(|c| c.trim().to_string());
        document.object_content = parsed.object_content;
        document.metadata = parsed.metadata;

        if let Some(content) = document.content.as_deref() {
            if let Some(findings) = self.rules.detect(content) {
                info!(file = %file.path_virtual, rules = findings.len(), "credentials found");
                self.alerters
                    .dispatch(
                        db,
                        self.crawl_id,
                        &self.crawl_name,
                        &file.fingerprint,
                        &file.path_virtual,
                        &findings,
                    )
                    .await;
                document.has_credential = true;
                document.credentials = Some(findings);
            }
        }

        document.truncate_content(general.indexed_chars);

        let empty = document
            .content
            .as_deref()
            .map(|c| c.is_empty())
            .unwrap_or(true);
        if empty && !general.index_empty_files {
            // The admission row already carries delivered=true, so the
            // selector never sees this file.
            self.counters.inc_skipped();
            return Ok(());
        }

        let payload = match serde_json::to_string(&document) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(file = %file.path_virtual, error = %err, "cannot serialize document");
                self.counters.inc_skipped();
                return Ok(());
            }
        };

        // Fast path first; any failure parks the payload for the selector.
        let (outbox_payload, delivered) = match self.sink.deliver(&document).await {
            Ok(()) => {
                self.counters.inc_delivered();
                (None, true)
            }
            Err(err) => {
                debug!(file = %file.path_virtual, error = %err, "immediate delivery failed, queued for retry");
                (Some(payload.as_str()), false)
            }
        };

        let db_ref: &CrawlDb = db;
        let marked = retry(OUTBOX_RETRY, DbError::is_busy, || {
            db_ref.mark_outbox(file_id, outbox_payload, delivered)
        })
        .await;

        match marked {
            Ok(()) => Ok(()),
            Err(err) if general.continue_on_error => {
                warn!(file = %file.path_virtual, error = %err, "cannot update outbox");
                Ok(())
            }
            Err(err) => Err(TaskError::Shutdown(format!(
                "cannot update outbox for {}: {err}",
                file.path_virtual
            ))),
        }
    }
}

fn blob_to_new_file(blob: &GitBlob, repo_root: &std::path::Path, repo_virtual: &str) -> NewFile {
    let filename = blob
        .path
        .rsplit('/')
        .next()
        .unwrap_or(blob.path.as_str())
        .to_string();
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    let short_id = &blob.object_id[..blob.object_id.len().min(8)];
    let content_hash = hash_bytes(&blob.content);
    let now = Utc::now();

    let prefix = if repo_virtual.is_empty() {
        String::new()
    } else {
        format!("{repo_virtual}/")
    };

    NewFile {
        fingerprint: fingerprint(&content_hash, &filename),
        mime_type: mime_for_extension(&extension).to_string(),
        extension,
        file_size: blob.content.len() as i64,
        created: now,
        last_accessed: now,
        last_modified: now,
        indexed_at: now,
        path_real: repo_root.to_string_lossy().to_string(),
        path_virtual: format!("{prefix}{}#{short_id}", blob.path),
        filename,
    }
}

// ============================================================================
// Delivery
// ============================================================================

pub(super) struct DeliveryWorker {
    pub db_path: PathBuf,
    pub sink: Arc<dyn Sink>,
    pub continue_on_error: bool,
    pub counters: Arc<Counters>,
}

#[async_trait]
impl Processor for DeliveryWorker {
    type Item = i64;
    type Resource = CrawlDb;

    async fn setup(&self, _worker: usize) -> anyhow::Result<CrawlDb> {
        Ok(CrawlDb::open_existing(&self.db_path).await?)
    }

    async fn process(
        &self,
        file_id: i64,
        db: &mut CrawlDb,
        _pool: &PoolHandle,
    ) -> Result<(), TaskError> {
        let db_ref: &CrawlDb = db;

        let record = match retry(OUTBOX_RETRY, DbError::is_busy, || db_ref.get_file(file_id)).await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(file_id, "pending row vanished");
                return Ok(());
            }
            Err(err) => {
                // Leave it pending; the selector will offer it again.
                warn!(file_id, error = %err, "cannot load pending row");
                return Ok(());
            }
        };

        if record.delivered {
            return Ok(());
        }

        let payload = match record.payload.as_deref() {
            Some(payload) if !payload.trim().is_empty() => payload,
            _ => {
                // Nothing to deliver; stop the selector from re-polling it.
                info!(file = %record.path_virtual, "empty outbox payload, marking delivered");
                self.mark(db_ref, file_id, None, true).await?;
                return Ok(());
            }
        };

        let document: Document = match serde_json::from_str(payload) {
            Ok(document) => document,
            Err(err) if self.continue_on_error => {
                error!(file = %record.path_virtual, error = %err, "corrupt outbox payload, dropping");
                self.mark(db_ref, file_id, None, true).await?;
                return Ok(());
            }
            Err(err) => {
                return Err(TaskError::Shutdown(format!(
                    "corrupt outbox payload for {}: {err}",
                    record.path_virtual
                )));
            }
        };

        match self.sink.deliver(&document).await {
            Ok(()) => {
                self.mark(db_ref, file_id, None, true).await?;
                self.counters.inc_delivered();
                Ok(())
            }
            Err(err) if err.is_transient() => {
                debug!(file = %record.path_virtual, error = %err, "sink unavailable, row stays pending");
                Ok(())
            }
            Err(err) if self.continue_on_error => {
                warn!(file = %record.path_virtual, error = %err, "sink rejected document, leaving pending");
                Ok(())
            }
            Err(err) => Err(TaskError::Shutdown(format!(
                "sink rejected document {}: {err}",
                record.fingerprint
            ))),
        }
    }
}

impl DeliveryWorker {
    async fn mark(
        &self,
        db: &CrawlDb,
        file_id: i64,
        payload: Option<&str>,
        delivered: bool,
    ) -> Result<(), TaskError> {
        let marked = retry(OUTBOX_RETRY, DbError::is_busy, || {
            db.mark_outbox(file_id, payload, delivered)
        })
        .await;

        match marked {
            Ok(()) => Ok(()),
            Err(err) if self.continue_on_error => {
                // Worst case the row is re-delivered; the sink is idempotent.
                warn!(file_id, error = %err, "cannot update outbox");
                Ok(())
            }
            Err(err) => Err(TaskError::Shutdown(format!(
                "cannot update outbox for row {file_id}: {err}"
            ))),
        }
    }
}

// ============================================================================
// Background loops
// ============================================================================

/// Republish undelivered ledger rows into the delivery pool, oldest first,
/// holding off while the delivery queue sits above its low-water mark.
pub(super) async fn selector_loop(
    db: CrawlDb,
    delivery: Arc<WorkerPool<i64>>,
    tuning: super::Tuning,
    cancel: CancelToken,
) {
    loop {
        if cancel.is_cancelled() || !delivery.is_running() {
            break;
        }

        while delivery.depth() > tuning.delivery_low_water {
            tokio::time::sleep(tuning.backpressure_pause).await;
            if cancel.is_cancelled() || !delivery.is_running() {
                return;
            }
        }

        match db.pending_batch(tuning.selector_batch).await {
            Ok(ids) => {
                if !ids.is_empty() {
                    debug!(count = ids.len(), "republishing undelivered rows");
                }
                for id in ids {
                    delivery.submit(id);
                }
            }
            Err(err) => warn!(error = %err, "selector cannot read pending rows"),
        }

        // Chunked sleep so cancellation is observed promptly.
        let mut remaining = tuning.selector_interval;
        while !remaining.is_zero() {
            let step = remaining.min(Duration::from_millis(300));
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
            if cancel.is_cancelled() || !delivery.is_running() {
                return;
            }
        }
    }
}

/// Continuous progress readout.
pub(super) async fn progress_loop(
    counters: Arc<Counters>,
    processing: PoolHandle,
    delivery: PoolHandle,
    cancel: CancelToken,
    tick: Duration,
) {
    let bar = ProgressBar::new_spinner();
    loop {
        if cancel.is_cancelled() || (!processing.is_running() && !delivery.is_running()) {
            break;
        }
        bar.set_message(format!(
            "read: {}, skipped: {}, delivered: {}",
            counters.read(),
            counters.skipped(),
            counters.delivered()
        ));
        bar.tick();
        tokio::time::sleep(tick).await;
    }
    bar.finish_and_clear();
}

/// Propagate cancellation and pool failure in both directions: a fatal
/// error in one pool stops the other, and an external cancel stops both.
pub(super) async fn cancel_watch(cancel: CancelToken, processing: PoolHandle, delivery: PoolHandle) {
    loop {
        if cancel.is_cancelled() || !processing.is_running() || !delivery.is_running() {
            processing.shutdown();
            delivery.shutdown();
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
