use std::sync::Arc;

use chrono::{DateTime, Utc};
use pagediff::models::{
    CaptureRole, DiffResult, HtmlSnapshot, MonitoredUrl, NewSnapshot, PollingTime, ResultId,
    ResultSummary, UrlId,
};
use pagediff::pipeline::DiffEngine;
use pagediff::storage::{StorageEngine, Store};
use pagediff::tracker::{compare_active, DiffTracker};
use pagediff::Result;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

#[tokio::test]
async fn sweep_compares_active_urls_and_records_poll() {
    let tracker = DiffTracker::new(StorageEngine::open_in_memory().unwrap(), DiffEngine::default());

    let news = tracker.add_url("https://example.com/news").unwrap();
    tracker
        .record_snapshot(news.id, CaptureRole::PreEvent, "a\nb\n", at(1))
        .unwrap();
    tracker
        .record_snapshot(news.id, CaptureRole::PostEvent, "a\nc\n", at(2))
        .unwrap();

    let paused = tracker.add_url("https://example.com/paused").unwrap();
    tracker.store().set_url_active(paused.id, false).unwrap();

    let tracker = Arc::new(tracker);
    let outcomes = compare_active(Arc::clone(&tracker)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].url_id, news.id);
    let stats = outcomes[0].stats.clone().expect("comparison succeeded");
    assert_eq!(stats.changes, 1);
    assert_eq!(stats.lines_affected, 1);

    let poll = tracker.store().last_poll().unwrap().expect("poll recorded");
    assert!(poll.success);
}

#[tokio::test]
async fn sweep_reports_urls_without_captures_as_failures() {
    let tracker = DiffTracker::new(StorageEngine::open_in_memory().unwrap(), DiffEngine::default());
    let fresh = tracker.add_url("https://example.com/fresh").unwrap();

    let tracker = Arc::new(tracker);
    let outcomes = compare_active(Arc::clone(&tracker)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].url_id, fresh.id);
    assert!(outcomes[0].result_id.is_none());
    assert!(outcomes[0].error.is_some());

    let poll = tracker.store().last_poll().unwrap().unwrap();
    assert!(!poll.success);
}

/// Store whose snapshot lookups panic for one URL.
struct PanicsFor {
    inner: StorageEngine,
    broken: UrlId,
}

impl Store for PanicsFor {
    fn save_url(&self, url: &str, created_at: DateTime<Utc>) -> Result<MonitoredUrl> {
        self.inner.save_url(url, created_at)
    }
    fn find_url(&self, id: UrlId) -> Result<Option<MonitoredUrl>> {
        self.inner.find_url(id)
    }
    fn list_urls(&self) -> Result<Vec<MonitoredUrl>> {
        self.inner.list_urls()
    }
    fn set_url_active(&self, id: UrlId, active: bool) -> Result<()> {
        self.inner.set_url_active(id, active)
    }
    fn delete_url(&self, id: UrlId) -> Result<()> {
        self.inner.delete_url(id)
    }
    fn persist_snapshot(&self, snapshot: &NewSnapshot) -> Result<HtmlSnapshot> {
        self.inner.persist_snapshot(snapshot)
    }
    fn list_snapshots(&self, url_id: UrlId) -> Result<Vec<HtmlSnapshot>> {
        self.inner.list_snapshots(url_id)
    }
    fn latest_snapshot(&self, url_id: UrlId, role: CaptureRole) -> Result<Option<HtmlSnapshot>> {
        if url_id == self.broken {
            panic!("snapshot lookup for url {url_id} blew up");
        }
        self.inner.latest_snapshot(url_id, role)
    }
    fn persist_diff_result(&self, result: &DiffResult) -> Result<ResultId> {
        self.inner.persist_diff_result(result)
    }
    fn load_diff_result(&self, id: ResultId) -> Result<Option<DiffResult>> {
        self.inner.load_diff_result(id)
    }
    fn delete_diff_result(&self, id: ResultId) -> Result<()> {
        self.inner.delete_diff_result(id)
    }
    fn list_diff_results(&self, url_id: UrlId) -> Result<Vec<ResultSummary>> {
        self.inner.list_diff_results(url_id)
    }
    fn record_poll(&self, polled_at: DateTime<Utc>, success: bool) -> Result<PollingTime> {
        self.inner.record_poll(polled_at, success)
    }
    fn last_poll(&self) -> Result<Option<PollingTime>> {
        self.inner.last_poll()
    }
}

#[tokio::test]
async fn panicking_comparison_is_reported_and_poll_still_recorded() {
    let inner = StorageEngine::open_in_memory().unwrap();
    let healthy = inner.save_url("https://example.com/ok", at(0)).unwrap();
    let broken = inner.save_url("https://example.com/broken", at(0)).unwrap();
    let tracker = DiffTracker::new(
        PanicsFor {
            inner,
            broken: broken.id,
        },
        DiffEngine::default(),
    );
    tracker
        .record_snapshot(healthy.id, CaptureRole::PreEvent, "a\n", at(1))
        .unwrap();
    tracker
        .record_snapshot(healthy.id, CaptureRole::PostEvent, "a\nb\n", at(2))
        .unwrap();

    let tracker = Arc::new(tracker);
    let outcomes = compare_active(Arc::clone(&tracker)).await.unwrap();
    assert_eq!(outcomes.len(), 2);

    let ok = outcomes.iter().find(|o| o.url_id == healthy.id).unwrap();
    assert!(ok.result_id.is_some());
    assert!(ok.error.is_none());

    let failed = outcomes.iter().find(|o| o.url_id == broken.id).unwrap();
    assert_eq!(failed.url, broken.url);
    assert!(failed.result_id.is_none());
    assert!(failed.error.as_deref().unwrap().contains("comparison task failed"));

    let poll = tracker.store().last_poll().unwrap().expect("poll recorded");
    assert!(!poll.success);
}
