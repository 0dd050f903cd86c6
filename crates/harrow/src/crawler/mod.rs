//! The pipeline orchestrator: discovery feeding a processing pool, a
//! delivery pool fed by the outbox selector, and cooperative teardown.

mod discover;
mod git;
mod item;
mod pipeline;

pub use discover::Discoverer;
pub use item::{CrawlItem, FileMeta};
pub use pipeline::Counters;

use crate::alerts::AlerterSet;
use crate::config::Config;
use crate::parsers::ParserRegistry;
use crate::sinks::Sink;
use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSetBuilder};
use harrow_db::{CrawlDb, CrawlStats};
use harrow_pool::{CancelToken, WorkerPool};
use harrow_rules::RuleSet;
use pipeline::{cancel_watch, progress_loop, selector_loop, DeliveryWorker, ProcessWorker};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Flow-control knobs. The defaults match a crawl of millions of small
/// files against a network sink; tests shrink the intervals.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Discovery pauses while the processing queue is above this.
    pub processing_high_water: usize,
    /// The selector pauses while the delivery queue is above this.
    pub delivery_low_water: usize,
    /// Rows fetched per selector poll.
    pub selector_batch: i64,
    /// Pause between selector polls.
    pub selector_interval: Duration,
    /// Producer-side spin-wait pause.
    pub backpressure_pause: Duration,
    /// Progress readout refresh.
    pub progress_tick: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            processing_high_water: 1000,
            delivery_low_water: 500,
            selector_batch: 1000,
            selector_interval: Duration::from_secs(5),
            backpressure_pause: Duration::from_millis(300),
            progress_tick: Duration::from_millis(300),
        }
    }
}

/// Counters and ledger totals for one finished run.
#[derive(Debug, Clone, Copy)]
pub struct CrawlReport {
    pub discovered: u64,
    pub read: u64,
    pub skipped: u64,
    pub delivered: u64,
    pub ledger: CrawlStats,
}

pub struct Crawler {
    config: Arc<Config>,
    tuning: Tuning,
    rules: Arc<RuleSet>,
    parsers: Arc<ParserRegistry>,
    sink: Arc<dyn Sink>,
    alerters: Arc<AlerterSet>,
}

impl Crawler {
    pub fn new(config: Config, rules: RuleSet, sink: Arc<dyn Sink>) -> Self {
        let alerters = AlerterSet::from_config(&config.alerts);
        Self {
            config: Arc::new(config),
            tuning: Tuning::default(),
            rules: Arc::new(rules),
            parsers: Arc::new(ParserRegistry::builtin()),
            sink,
            alerters: Arc::new(alerters),
        }
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Run one crawl over `path`. Returns when discovery is exhausted and
    /// both pools have drained, or when a fatal condition (or `cancel`)
    /// stopped the run.
    pub async fn run(&self, path: &Path, cancel: CancelToken) -> Result<CrawlReport> {
        let general = &self.config.general;
        let db_path = general.db_path();

        let db = CrawlDb::open(&db_path).await?;
        let crawl = db.ensure_crawl(&general.crawl_name).await?;
        info!(crawl = %crawl.name, id = crawl.id, path = %path.display(), "crawl starting");

        match self.sink.prepare(&crawl.name).await {
            Ok(()) => {}
            Err(err) if err.is_transient() => {
                // Documents will pile up in the outbox until it returns.
                warn!(sink = self.sink.name(), error = %err, "sink unavailable at startup");
            }
            Err(err) => bail!("sink preparation failed: {err}"),
        }

        let mut excludes = GlobSetBuilder::new();
        for pattern in &general.excludes {
            excludes.add(
                Glob::new(&pattern.to_lowercase())
                    .with_context(|| format!("invalid exclude pattern {pattern:?}"))?,
            );
        }
        let excludes = excludes.build().context("failed to build exclude set")?;

        let counters = Arc::new(Counters::default());
        let (processing_size, delivery_size) = general.pool_sizes();

        let processing = Arc::new(
            WorkerPool::start(
                "processing",
                processing_size,
                Arc::new(ProcessWorker {
                    db_path: db_path.clone(),
                    base: path.to_path_buf(),
                    crawl_id: crawl.id,
                    crawl_name: crawl.name.clone(),
                    config: Arc::clone(&self.config),
                    excludes,
                    rules: Arc::clone(&self.rules),
                    parsers: Arc::clone(&self.parsers),
                    sink: Arc::clone(&self.sink),
                    alerters: Arc::clone(&self.alerters),
                    counters: Arc::clone(&counters),
                }),
            )
            .await?,
        );

        let delivery = Arc::new(
            WorkerPool::start(
                "delivery",
                delivery_size,
                Arc::new(DeliveryWorker {
                    db_path: db_path.clone(),
                    sink: Arc::clone(&self.sink),
                    continue_on_error: general.continue_on_error,
                    counters: Arc::clone(&counters),
                }),
            )
            .await?,
        );

        let watcher = tokio::spawn(cancel_watch(
            cancel.clone(),
            processing.handle(),
            delivery.handle(),
        ));
        let selector = tokio::spawn(selector_loop(
            db.clone(),
            Arc::clone(&delivery),
            self.tuning.clone(),
            cancel.clone(),
        ));
        let progress = tokio::spawn(progress_loop(
            Arc::clone(&counters),
            processing.handle(),
            delivery.handle(),
            cancel.clone(),
            self.tuning.progress_tick,
        ));

        // Discovery runs on a blocking thread, spin-waiting against the
        // processing high-water mark.
        let discoverer = Discoverer::new(path, &general.excludes, general.git_support)?;
        let walk_pool = Arc::clone(&processing);
        let walk_cancel = cancel.clone();
        let tuning = self.tuning.clone();
        let discovered = tokio::task::spawn_blocking(move || {
            discoverer.scan(&mut |item| {
                if walk_cancel.is_cancelled() || !walk_pool.is_running() {
                    return false;
                }
                while walk_pool.depth() > tuning.processing_high_water {
                    std::thread::sleep(tuning.backpressure_pause);
                    if walk_cancel.is_cancelled() || !walk_pool.is_running() {
                        return false;
                    }
                }
                walk_pool.submit(item);
                true
            })
        })
        .await
        .context("discovery thread panicked")?;

        info!(discovered, "file list finished, waiting for processors");
        processing.wait_until_drained().await;

        // Let the selector flush whatever the fast path could not deliver.
        // Once the backlog stops shrinking the sink is down and the rows
        // stay parked for the next run.
        let mut last_pending = u64::MAX;
        let mut stalled = 0;
        loop {
            delivery.wait_until_drained().await;
            if cancel.is_cancelled() || !delivery.is_running() || !processing.is_running() {
                break;
            }
            let pending = db.stats(crawl.id).await.map(|s| s.pending).unwrap_or(0);
            if pending == 0 {
                break;
            }
            if pending >= last_pending {
                stalled += 1;
                if stalled >= 2 {
                    warn!(pending, "sink unreachable, leaving backlog for the next run");
                    break;
                }
            } else {
                stalled = 0;
            }
            last_pending = pending;
            tokio::time::sleep(self.tuning.selector_interval + self.tuning.backpressure_pause)
                .await;
        }

        let fatal = (!processing.is_running() || !delivery.is_running()) && !cancel.is_cancelled();
        let interrupted = cancel.is_cancelled();

        cancel.cancel();
        processing.join().await;
        delivery.join().await;
        let _ = selector.await;
        let _ = progress.await;
        let _ = watcher.await;

        let ledger = db.stats(crawl.id).await?;
        let report = CrawlReport {
            discovered,
            read: counters.read(),
            skipped: counters.skipped(),
            delivered: counters.delivered(),
            ledger,
        };

        if fatal {
            bail!(
                "crawl aborted by a fatal error after {} read, {} delivered (see logs)",
                report.read,
                report.delivered
            );
        }
        if interrupted {
            warn!("crawl interrupted, undelivered rows stay queued for the next run");
        }
        info!(
            read = report.read,
            skipped = report.skipped,
            delivered = report.delivered,
            pending = report.ledger.pending,
            "crawl finished"
        );
        Ok(report)
    }
}
