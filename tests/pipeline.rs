//! Integration tests for the paginator, normalizer, and SQLite sink working
//! together.
//!
//! A scripted in-process feed stands in for the network so each test can
//! dictate exactly which pages succeed, fail, or come back short.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use nvd_sync::config::Config;
use nvd_sync::error::{FetchError, SyncError};
use nvd_sync::feed::FeedSource;
use nvd_sync::models::{CanonicalRecord, PersistedEntity, SyncRun, UpsertOutcome};
use nvd_sync::pipeline::{PaginationSettings, SyncPipeline};
use nvd_sync::progress::NoProgress;
use nvd_sync::query::CveQuery;
use nvd_sync::retry::FixedBackoff;
use nvd_sync::sqlite_store::SqliteStore;
use nvd_sync::store::Store;
use nvd_sync::sync::{trigger_sync_with_feed, SyncMode};

// ─── Scripted feed ──────────────────────────────────────────────────

type PageResult = Result<Vec<Value>, FetchError>;

/// Replays a fixed script of responses and records every request.
struct ScriptedFeed {
    script: Mutex<VecDeque<PageResult>>,
    requests: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedFeed {
    fn new(script: Vec<PageResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<(usize, usize)> {
        self.requests.lock().unwrap().clone()
    }

    fn offsets(&self) -> Vec<usize> {
        self.requests().into_iter().map(|(offset, _)| offset).collect()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_page(&self, offset: usize, page_size: usize) -> PageResult {
        self.requests.lock().unwrap().push((offset, page_size));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request at offset {}", offset))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn cve(id: &str, score: f64) -> Value {
    json!({
        "cve": {
            "id": id,
            "published": "2024-05-01T12:00:00.000",
            "lastModified": "2024-05-02T12:00:00.000",
            "descriptions": [ { "lang": "en", "value": format!("Description of {}", id) } ],
            "metrics": { "cvssMetricV31": [ { "cvssData": { "baseScore": score } } ] }
        }
    })
}

fn page(ids: std::ops::Range<usize>) -> Vec<Value> {
    ids.map(|n| cve(&format!("CVE-2024-{:04}", n), 5.0)).collect()
}

fn malformed() -> Value {
    json!({ "note": "this entry carries no identity at all" })
}

fn settings(page_size: usize) -> PaginationSettings {
    PaginationSettings {
        page_size,
        politeness_delay: Duration::ZERO,
    }
}

fn test_config(tmp: &TempDir, page_size: usize) -> Config {
    let content = format!(
        r#"
[db]
path = "{}"

[feed]
base_url = "http://127.0.0.1:9/unused"
results_per_page = {}
politeness_delay_ms = 0
retry_delay_secs = 0
"#,
        tmp.path().join("nvd.sqlite").display(),
        page_size
    );
    toml::from_str(&content).unwrap()
}

async fn open_store(tmp: &TempDir) -> SqliteStore {
    SqliteStore::open(&test_config(tmp, 200)).await.unwrap()
}

async fn run_pipeline(
    feed: &ScriptedFeed,
    store: &dyn Store,
    page_size: usize,
) -> Result<SyncRun, SyncError> {
    let retry = FixedBackoff::unbounded(Duration::ZERO);
    SyncPipeline::new(feed, store, &retry, &NoProgress, settings(page_size))
        .run()
        .await
}

fn transient() -> FetchError {
    FetchError::Status {
        status: 503,
        body: "Service Unavailable".to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

/// Three good records and one malformed one: first run inserts, second updates.
#[tokio::test]
async fn end_to_end_first_and_second_run() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let records = vec![
        cve("CVE-2024-0001", 9.8),
        malformed(),
        cve("CVE-2024-0002", 7.5),
        cve("CVE-2024-0003", 4.3),
    ];

    let first = ScriptedFeed::new(vec![Ok(records.clone())]);
    let run = run_pipeline(&first, &store, 200).await.unwrap();
    assert_eq!(
        run,
        SyncRun {
            processed: 4,
            inserted: 3,
            updated: 0
        }
    );
    assert_eq!(run.skipped(), 1);

    let second = ScriptedFeed::new(vec![Ok(records)]);
    let run = run_pipeline(&second, &store, 200).await.unwrap();
    assert_eq!(
        run,
        SyncRun {
            processed: 4,
            inserted: 0,
            updated: 3
        }
    );

    assert_eq!(store.count(&CveQuery::default()).await.unwrap(), 3);
    store.close().await;
}

/// Full pages until a short one; no request after the short page.
#[tokio::test]
async fn terminates_after_short_page() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let feed = ScriptedFeed::new(vec![Ok(page(0..3)), Ok(page(3..6)), Ok(page(6..7))]);
    let run = run_pipeline(&feed, &store, 3).await.unwrap();

    assert_eq!(feed.offsets(), vec![0, 3, 6]);
    assert!(feed.requests().iter().all(|(_, size)| *size == 3));
    assert_eq!(run.processed, 7);
    assert_eq!(run.inserted, 7);
    store.close().await;
}

/// A full final page needs one more request, which comes back empty.
#[tokio::test]
async fn terminates_on_empty_page() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let feed = ScriptedFeed::new(vec![Ok(page(0..2)), Ok(page(2..4)), Ok(Vec::new())]);
    let run = run_pipeline(&feed, &store, 2).await.unwrap();

    assert_eq!(feed.offsets(), vec![0, 2, 4]);
    assert_eq!(run.processed, 4);
    store.close().await;
}

/// An empty feed produces an empty run.
#[tokio::test]
async fn empty_feed() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let feed = ScriptedFeed::new(vec![Ok(Vec::new())]);
    let run = run_pipeline(&feed, &store, 200).await.unwrap();

    assert_eq!(run, SyncRun::default());
    assert_eq!(feed.offsets(), vec![0]);
    store.close().await;
}

/// A failed page is retried at the same offset and applied exactly once.
#[tokio::test]
async fn backoff_keeps_offset() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let feed = ScriptedFeed::new(vec![
        Ok(page(0..2)),
        Err(transient()),
        Err(FetchError::Malformed("truncated body".to_string())),
        Ok(page(2..4)),
        Ok(page(4..5)),
    ]);
    let run = run_pipeline(&feed, &store, 2).await.unwrap();

    assert_eq!(feed.offsets(), vec![0, 2, 2, 2, 4]);
    assert_eq!(
        run,
        SyncRun {
            processed: 5,
            inserted: 5,
            updated: 0
        }
    );
    store.close().await;
}

/// With a ceiling configured, the run aborts and reports what it wrote.
#[tokio::test]
async fn bounded_policy_gives_up() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let feed = ScriptedFeed::new(vec![
        Ok(page(0..2)),
        Err(transient()),
        Err(transient()),
        Err(transient()),
    ]);
    let retry = FixedBackoff::with_ceiling(Duration::ZERO, 2);
    let err = SyncPipeline::new(&feed, &store, &retry, &NoProgress, settings(2))
        .run()
        .await
        .unwrap_err();

    match err {
        SyncError::RetriesExhausted {
            offset,
            attempts,
            run,
            ..
        } => {
            assert_eq!(offset, 2);
            assert_eq!(attempts, 3);
            assert_eq!(run.inserted, 2);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(feed.offsets(), vec![0, 2, 2, 2]);
    store.close().await;
}

/// Records within a page reach the store in the order received.
#[tokio::test]
async fn records_applied_in_order() {
    struct RecordingStore {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
            self.seen
                .lock()
                .unwrap()
                .push(record.identity().unwrap().to_string());
            Ok(UpsertOutcome::Inserted)
        }
        async fn find(&self, _id: &str) -> Result<Option<PersistedEntity>> {
            Ok(None)
        }
        async fn list(&self, _query: &CveQuery) -> Result<Vec<PersistedEntity>> {
            Ok(Vec::new())
        }
        async fn count(&self, _query: &CveQuery) -> Result<i64> {
            Ok(0)
        }
    }

    let store = RecordingStore {
        seen: Mutex::new(Vec::new()),
    };
    let feed = ScriptedFeed::new(vec![Ok(vec![
        cve("CVE-2024-0300", 1.0),
        malformed(),
        cve("CVE-2024-0100", 1.0),
        cve("CVE-2024-0200", 1.0),
    ])]);
    run_pipeline(&feed, &store, 10).await.unwrap();

    assert_eq!(
        *store.seen.lock().unwrap(),
        vec!["CVE-2024-0300", "CVE-2024-0100", "CVE-2024-0200"]
    );
}

/// A store failure aborts the run; counts reflect only completed writes.
#[tokio::test]
async fn persistence_failure_aborts_with_partial_counts() {
    struct FailingStore {
        inner: SqliteStore,
        fail_on: &'static str,
    }

    #[async_trait]
    impl Store for FailingStore {
        async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
            if record.identity() == Some(self.fail_on) {
                anyhow::bail!("database is locked");
            }
            self.inner.upsert(record).await
        }
        async fn find(&self, id: &str) -> Result<Option<PersistedEntity>> {
            self.inner.find(id).await
        }
        async fn list(&self, query: &CveQuery) -> Result<Vec<PersistedEntity>> {
            self.inner.list(query).await
        }
        async fn count(&self, query: &CveQuery) -> Result<i64> {
            self.inner.count(query).await
        }
    }

    let tmp = TempDir::new().unwrap();
    let store = FailingStore {
        inner: open_store(&tmp).await,
        fail_on: "CVE-2024-0002",
    };

    let feed = ScriptedFeed::new(vec![Ok(page(0..5))]);
    let err = run_pipeline(&feed, &store, 10).await.unwrap_err();

    let partial = err.partial_run().expect("partial counts");
    assert!(matches!(err, SyncError::Persistence { .. }));
    assert_eq!(partial.inserted, 2);
    assert_eq!(partial.updated, 0);
    assert_eq!(partial.processed, 3);
    assert!(err.to_string().contains("database is locked"));

    assert_eq!(store.inner.count(&CveQuery::default()).await.unwrap(), 2);
    assert_eq!(feed.offsets(), vec![0], "no further pages after an abort");
    store.inner.close().await;
}

/// Re-applying a record leaves one entity holding the latest values.
#[tokio::test]
async fn idempotent_across_runs_with_latest_values() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let v1 = cve("CVE-2024-0042", 5.0);
    let mut v2 = cve("CVE-2024-0042", 8.1);
    v2["cve"]["descriptions"][0]["value"] = json!("Revised description");

    run_pipeline(&ScriptedFeed::new(vec![Ok(vec![v1])]), &store, 10)
        .await
        .unwrap();
    run_pipeline(&ScriptedFeed::new(vec![Ok(vec![v2.clone()])]), &store, 10)
        .await
        .unwrap();

    assert_eq!(store.count(&CveQuery::default()).await.unwrap(), 1);
    let stored = store.find("CVE-2024-0042").await.unwrap().unwrap();
    assert_eq!(stored.severity_v3, Some(8.1));
    assert_eq!(stored.summary, "Revised description");
    assert_eq!(stored.raw, v2);
    assert_eq!(stored.year, Some(2024));
    store.close().await;
}

/// `trigger_sync_with_feed` opens and releases its own store.
#[tokio::test]
async fn trigger_sync_uses_configured_store() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 2);

    let feed = ScriptedFeed::new(vec![Ok(page(0..2)), Ok(page(2..3))]);
    let run = trigger_sync_with_feed(&cfg, SyncMode::Full, &feed, &NoProgress)
        .await
        .unwrap();
    assert_eq!(run.inserted, 3);

    let store = SqliteStore::open(&cfg).await.unwrap();
    assert_eq!(store.count(&CveQuery::default()).await.unwrap(), 3);
    store.close().await;
}
