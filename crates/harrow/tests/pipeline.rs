//! End-to-end pipeline tests against an in-memory sink.

use async_trait::async_trait;
use harrow::config::Config;
use harrow::crawler::{Crawler, Tuning};
use harrow::document::Document;
use harrow::sinks::{Sink, SinkError};
use harrow_db::CrawlDb;
use harrow_pool::CancelToken;
use harrow_rules::rules::default_context;
use harrow_rules::{builtin_rules, RuleSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Sink that fails a configurable number of deliveries before accepting,
/// recording everything it accepted.
#[derive(Default)]
struct FlakySink {
    fail_remaining: AtomicI64,
    fatal: AtomicI64,
    attempts: AtomicU64,
    accepted: Mutex<Vec<Document>>,
}

impl FlakySink {
    fn failing(times: i64) -> Self {
        let sink = Self::default();
        sink.fail_remaining.store(times, Ordering::SeqCst);
        sink
    }

    fn recover(&self) {
        self.fail_remaining.store(0, Ordering::SeqCst);
    }

    fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn accepted(&self) -> Vec<Document> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for FlakySink {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn deliver(&self, document: &Document) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fatal.load(Ordering::SeqCst) > 0 {
            return Err(SinkError::fatal("document rejected"));
        }
        if self.fail_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(SinkError::transient("sink offline"));
        }
        self.accepted.lock().unwrap().push(document.clone());
        Ok(())
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.general.crawl_name = "testcrawl".to_string();
    config.general.db_file = Some(dir.join("ledger.sqlite3"));
    config.general.tasks = 3;
    config.general.git_support = false;
    config
}

fn test_tuning() -> Tuning {
    Tuning {
        selector_interval: Duration::from_millis(50),
        progress_tick: Duration::from_millis(50),
        ..Tuning::default()
    }
}

fn stock_rules() -> RuleSet {
    RuleSet::register(builtin_rules(&default_context())).expect("rules validate")
}

fn crawler(config: Config, sink: Arc<FlakySink>) -> Crawler {
    Crawler::new(config, stock_rules(), sink).with_tuning(test_tuning())
}

async fn open_ledger(config: &Config) -> (CrawlDb, i64) {
    let db = CrawlDb::open(config.general.db_path()).await.unwrap();
    let crawl = db.ensure_crawl(&config.general.crawl_name).await.unwrap();
    (db, crawl.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crawl_detects_and_delivers_credentials() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.txt"), "admin:Str0ngP@ss!@example.com").unwrap();

    let config = test_config(dir.path());
    let sink = Arc::new(FlakySink::default());
    let report = crawler(config.clone(), Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.read, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.delivered, 1);

    let accepted = sink.accepted();
    assert_eq!(accepted.len(), 1);
    let doc = &accepted[0];
    assert!(doc.has_credential);
    let creds = doc.credentials.as_ref().unwrap();
    let finding = &creds["leaked-inline-creds"].findings[0];
    assert!(finding.severity >= 70, "severity {}", finding.severity);

    let (db, crawl_id) = open_ledger(&config).await;
    let stats = db.stats(crawl_id).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recrawl_of_unchanged_tree_skips_processing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.txt"), "admin:Str0ngP@ss!@example.com").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "nothing secret here").unwrap();

    let config = test_config(dir.path());
    let sink = Arc::new(FlakySink::default());

    let first = crawler(config.clone(), Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(first.read, 2);
    assert_eq!(first.delivered, 2);
    let attempts_after_first = sink.attempts();

    let second = crawler(config.clone(), Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(second.read, 2);
    assert_eq!(second.skipped, 2, "both files already admitted");
    assert_eq!(second.delivered, 0);
    assert_eq!(sink.attempts(), attempts_after_first, "no new sink calls");

    let (db, crawl_id) = open_ledger(&config).await;
    assert_eq!(db.count_files(crawl_id).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_failures_end_in_delivery_with_payload_intact() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.txt"), "admin:Str0ngP@ss!@example.com").unwrap();

    let config = test_config(dir.path());
    // Immediate attempt plus one selector retry fail; the next succeeds.
    let sink = Arc::new(FlakySink::failing(2));
    let report = crawler(config.clone(), Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(sink.attempts(), 3, "two transient failures then success");

    let accepted = sink.accepted();
    assert_eq!(accepted.len(), 1);
    assert!(
        accepted[0].content.as_deref().unwrap().contains("Str0ngP@ss!"),
        "payload survived the retries unchanged"
    );

    let (db, crawl_id) = open_ledger(&config).await;
    let stats = db.stats(crawl_id).await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn offline_sink_parks_payload_until_next_run() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.txt"), "admin:Str0ngP@ss!@example.com").unwrap();

    let config = test_config(dir.path());
    let sink = Arc::new(FlakySink::failing(i64::MAX));

    let first = crawler(config.clone(), Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(first.delivered, 0);

    let (db, _crawl_id) = open_ledger(&config).await;
    let pending = db.pending_batch(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    let row = db.get_file(pending[0]).await.unwrap().unwrap();
    assert!(!row.delivered);
    assert!(row.payload.as_deref().unwrap().contains("Str0ngP@ss!"));
    drop(db);

    // Sink comes back; the next run's selector republishes the row even
    // though the file itself is skipped as already known.
    sink.recover();
    let second = crawler(config.clone(), Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(second.delivered, 1);

    let (db, crawl_id) = open_ledger(&config).await;
    let stats = db.stats(crawl_id).await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.delivered, 1);
    let row = db.get_file(pending[0]).await.unwrap().unwrap();
    assert!(row.delivered);
    assert!(row.payload.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_files_are_recorded_but_not_delivered() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("empty.txt"), "").unwrap();

    let config = test_config(dir.path());
    let sink = Arc::new(FlakySink::default());
    let report = crawler(config.clone(), Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.read, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(sink.attempts(), 0);

    // Recorded and marked delivered so the selector never re-offers it.
    let (db, crawl_id) = open_ledger(&config).await;
    let stats = db.stats(crawl_id).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fatal_sink_error_aborts_an_intolerant_run() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.txt"), "admin:Str0ngP@ss!@example.com").unwrap();

    let mut config = test_config(dir.path());
    config.general.continue_on_error = false;

    let sink = Arc::new(FlakySink::default());
    sink.fatal.store(1, Ordering::SeqCst);

    let result = crawler(config, Arc::clone(&sink))
        .run(dir.path(), CancelToken::new())
        .await;
    assert!(result.is_err(), "fatal sink error must abort the run");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backpressure_crawl_completes_with_a_tiny_high_water_mark() {
    let dir = TempDir::new().unwrap();
    for i in 0..40 {
        std::fs::write(
            dir.path().join(format!("file-{i:02}.txt")),
            format!("note {i}: nothing secret"),
        )
        .unwrap();
    }

    let config = test_config(dir.path());
    let sink = Arc::new(FlakySink::default());
    let tuning = Tuning {
        processing_high_water: 5,
        backpressure_pause: Duration::from_millis(10),
        selector_interval: Duration::from_millis(50),
        ..Tuning::default()
    };

    let report = Crawler::new(config, stock_rules(), sink.clone())
        .with_tuning(tuning)
        .run(dir.path(), CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.discovered, 40);
    assert_eq!(report.read, 40);
    assert_eq!(report.delivered, 40);
    assert_eq!(sink.accepted().len(), 40);
}
