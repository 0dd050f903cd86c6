use chrono::{Duration, Utc};
use harrow_db::{CrawlDb, NewFile};
use tempfile::TempDir;

fn sample_file(fingerprint: &str, name: &str) -> NewFile {
    let now = Utc::now();
    NewFile {
        fingerprint: fingerprint.to_string(),
        filename: name.to_string(),
        extension: "txt".to_string(),
        mime_type: "text/plain".to_string(),
        file_size: 42,
        created: now,
        last_accessed: now,
        last_modified: now,
        indexed_at: now,
        path_real: format!("/tmp/{name}"),
        path_virtual: name.to_string(),
    }
}

async fn open_db(dir: &TempDir) -> CrawlDb {
    CrawlDb::open(dir.path().join("ledger.sqlite3")).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ensure_crawl_is_idempotent_and_lowercases() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let a = db.ensure_crawl("Leaks-2024").await.unwrap();
    let b = db.ensure_crawl("leaks-2024").await.unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(b.name, "leaks-2024");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_upsert_reports_not_inserted_and_keeps_content_fields() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;
    let crawl = db.ensure_crawl("t").await.unwrap();

    let file = sample_file("fp-1", "creds.txt");
    let first = db
        .upsert_file(crawl.id, &file, Some("{\"content\":\"x\"}"), false)
        .await
        .unwrap();
    assert!(first.inserted);
    assert!(!first.record.delivered);

    // Re-sighting the same fingerprint must not disturb the outbox state,
    // only refresh identity fields.
    let mut again = sample_file("fp-1", "creds.txt");
    again.file_size = 99;
    again.path_real = "/mnt/elsewhere/creds.txt".to_string();
    let second = db.upsert_file(crawl.id, &again, None, true).await.unwrap();

    assert!(!second.inserted);
    assert_eq!(second.record.id, first.record.id);
    assert_eq!(second.record.file_size, 99);
    assert_eq!(second.record.path_real, "/mnt/elsewhere/creds.txt");
    assert_eq!(second.record.payload.as_deref(), Some("{\"content\":\"x\"}"));
    assert!(!second.record.delivered);

    assert_eq!(db.count_files(crawl.id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_fingerprint_under_other_crawl_inserts() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;
    let one = db.ensure_crawl("one").await.unwrap();
    let two = db.ensure_crawl("two").await.unwrap();

    let file = sample_file("fp-shared", "a.txt");
    assert!(db.upsert_file(one.id, &file, None, true).await.unwrap().inserted);
    assert!(db.upsert_file(two.id, &file, None, true).await.unwrap().inserted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_batch_is_oldest_first_and_capped() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;
    let crawl = db.ensure_crawl("t").await.unwrap();

    let base = Utc::now();
    let mut ids = Vec::new();
    for i in 0..5 {
        let mut file = sample_file(&format!("fp-{i}"), &format!("f{i}.txt"));
        // Newest first on insert; pending_batch must invert the order.
        file.indexed_at = base - Duration::seconds(i);
        let outcome = db
            .upsert_file(crawl.id, &file, Some("{}"), false)
            .await
            .unwrap();
        ids.push(outcome.record.id);
    }

    let batch = db.pending_batch(3).await.unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0], ids[4], "oldest indexed_at comes first");

    // Delivering a row removes it from the next batch.
    db.mark_outbox(ids[4], None, true).await.unwrap();
    let batch = db.pending_batch(10).await.unwrap();
    assert_eq!(batch.len(), 4);
    assert!(!batch.contains(&ids[4]));

    let row = db.get_file(ids[4]).await.unwrap().unwrap();
    assert!(row.delivered);
    assert!(row.payload.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn alerts_deduplicate_per_crawl() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;
    let crawl = db.ensure_crawl("t").await.unwrap();

    let (alert, inserted) = db
        .insert_or_get_alert(crawl.id, "file-fp", "finding-fp", Some("{}"))
        .await
        .unwrap();
    assert!(inserted);
    assert!(!alert.sent);

    let (again, inserted) = db
        .insert_or_get_alert(crawl.id, "file-fp", "finding-fp", Some("{}"))
        .await
        .unwrap();
    assert!(!inserted);
    assert_eq!(again.id, alert.id);

    db.mark_alert_sent(alert.id).await.unwrap();
    let (sent, inserted) = db
        .insert_or_get_alert(crawl.id, "file-fp", "finding-fp", None)
        .await
        .unwrap();
    assert!(!inserted);
    assert!(sent.sent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats_track_delivery_state() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;
    let crawl = db.ensure_crawl("t").await.unwrap();

    let delivered = db
        .upsert_file(crawl.id, &sample_file("fp-a", "a"), None, true)
        .await
        .unwrap();
    db.upsert_file(crawl.id, &sample_file("fp-b", "b"), Some("{}"), false)
        .await
        .unwrap();

    let stats = db.stats(crawl.id).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.pending, 1);
    assert!(delivered.record.delivered);
}
