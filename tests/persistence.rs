use chrono::{DateTime, Utc};
use pagediff::models::{CaptureRole, DeltaKind, DiffResult, HtmlSnapshot, SnapshotId};
use pagediff::pipeline::{self, DiffEngine};
use pagediff::storage::{StorageEngine, Store};
use pagediff::tracker::DiffTracker;
use pagediff::Error;
use tempfile::TempDir;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn tracker() -> DiffTracker<StorageEngine> {
    DiffTracker::new(StorageEngine::open_in_memory().unwrap(), DiffEngine::default())
}

const ORIGINAL: &str = "<html>\n<h1>Prices</h1>\n<li>apple 1</li>\n<li>pear 2</li>\n<li>plum 3</li>\n</html>\n";
const REVISED: &str = "<html>\n<h1>Prices</h1>\n<li>apple 4</li>\n<li>pear 2</li>\n<li>fig 9</li>\n<li>plum 3</li>\n</html>\n";

fn seeded(tracker: &DiffTracker<StorageEngine>) -> (pagediff::models::MonitoredUrl, HtmlSnapshot, HtmlSnapshot) {
    let url = tracker.add_url("https://example.com/foo.html").unwrap();
    let pre = tracker
        .record_snapshot(url.id, CaptureRole::PreEvent, ORIGINAL, at(100))
        .unwrap();
    let post = tracker
        .record_snapshot(url.id, CaptureRole::PostEvent, REVISED, at(200))
        .unwrap();
    (url, pre, post)
}

#[test]
fn diff_result_round_trips() {
    let tracker = tracker();
    let (url, pre, post) = seeded(&tracker);

    let result = tracker
        .build_and_persist_diff_result(&url, Some(&pre), Some(&post))
        .unwrap();
    let id = result.id.expect("persisted result has an id");
    assert_eq!(result.change_deltas().len(), 1);
    assert_eq!(result.insert_deltas().len(), 1);
    assert_eq!(result.total_lines_affected(), 2);

    let loaded = tracker.store().load_diff_result(id).unwrap().unwrap();
    assert_eq!(loaded.url_id, url.id);
    assert_eq!(loaded.patch.deltas, result.patch.deltas);
    assert_eq!(loaded.captured_at.timestamp_millis(), result.captured_at.timestamp_millis());
    assert!(loaded.patch.id.is_some());
    assert_eq!(loaded.pre_event_snapshot(), Some(&pre));
    assert_eq!(loaded.post_event_snapshot(), Some(&post));
    let kinds: Vec<DeltaKind> = loaded.patch.deltas.iter().map(|d| d.kind()).collect();
    assert_eq!(kinds, vec![DeltaKind::Change, DeltaKind::Insert]);
}

#[test]
fn unchanged_page_is_stored_as_empty_patch() {
    let tracker = tracker();
    let url = tracker.add_url("https://example.com/").unwrap();
    let pre = tracker
        .record_snapshot(url.id, CaptureRole::PreEvent, "same\n", at(1))
        .unwrap();
    let post = tracker
        .record_snapshot(url.id, CaptureRole::PostEvent, "same\u{200B}\n", at(2))
        .unwrap();
    let result = tracker
        .build_and_persist_diff_result(&url, Some(&pre), Some(&post))
        .unwrap();
    let loaded = tracker
        .store()
        .load_diff_result(result.id.unwrap())
        .unwrap()
        .unwrap();
    assert!(!loaded.has_deltas());
    assert_eq!(loaded.delta_count(), 0);
    assert_eq!(loaded.total_lines_affected(), 0);
}

#[test]
fn missing_result_loads_as_none() {
    let tracker = tracker();
    let missing = pagediff::models::ResultId(99);
    assert!(tracker.store().load_diff_result(missing).unwrap().is_none());
    assert!(tracker
        .store()
        .delete_diff_result(missing)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn rejected_persist_leaves_nothing_behind() {
    let tracker = tracker();
    let (url, pre, post) = seeded(&tracker);
    let mut result = pipeline::build_diff_result(
        tracker.engine(),
        &url,
        Some(&pre),
        Some(&post),
        at(300),
    )
    .unwrap();
    let mut ghost = post.clone();
    ghost.id = SnapshotId(9_999);
    result.snapshots.push(ghost);

    let err = tracker.store().persist_diff_result(&result).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(tracker.store().list_diff_results(url.id).unwrap().is_empty());
}

#[test]
fn deleting_result_removes_its_exclusive_snapshots() {
    let tracker = tracker();
    let (url, pre, post) = seeded(&tracker);
    let first = tracker
        .build_and_persist_diff_result(&url, Some(&pre), Some(&post))
        .unwrap();

    let newer_post = tracker
        .record_snapshot(url.id, CaptureRole::PostEvent, "<html>\n</html>\n", at(300))
        .unwrap();
    let second = tracker
        .build_and_persist_diff_result(&url, Some(&pre), Some(&newer_post))
        .unwrap();

    tracker.store().delete_diff_result(first.id.unwrap()).unwrap();
    let remaining: Vec<SnapshotId> = tracker
        .store()
        .list_snapshots(url.id)
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    // `pre` is still referenced by the second result.
    assert_eq!(remaining, vec![pre.id, newer_post.id]);

    let summaries = tracker.store().list_diff_results(url.id).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(Some(summaries[0].id), second.id);
}

#[test]
fn deleting_url_cascades() {
    let tracker = tracker();
    let (url, pre, post) = seeded(&tracker);
    let result = tracker
        .build_and_persist_diff_result(&url, Some(&pre), Some(&post))
        .unwrap();

    tracker.store().delete_url(url.id).unwrap();
    assert!(tracker.store().find_url(url.id).unwrap().is_none());
    assert!(tracker.store().list_snapshots(url.id).unwrap().is_empty());
    assert!(tracker
        .store()
        .load_diff_result(result.id.unwrap())
        .unwrap()
        .is_none());
}

#[test]
fn latest_snapshot_by_timestamp_then_insertion() {
    let tracker = tracker();
    let url = tracker.add_url("https://example.com").unwrap();
    for i in 0..6 {
        let role = if i % 2 == 0 {
            CaptureRole::PostEvent
        } else {
            CaptureRole::PreEvent
        };
        tracker
            .record_snapshot(url.id, role, &format!("random body {i}"), at(10 + i))
            .unwrap();
    }
    let latest = tracker
        .record_snapshot(url.id, CaptureRole::PostEvent, "Latest snapshot here.", at(1_000))
        .unwrap();
    let found = tracker
        .get_latest_snapshot(url.id, CaptureRole::PostEvent)
        .unwrap()
        .unwrap();
    assert_eq!(found, latest);

    let tied = tracker
        .record_snapshot(url.id, CaptureRole::PostEvent, "Same second, recorded later.", at(1_000))
        .unwrap();
    let found = tracker
        .get_latest_snapshot(url.id, CaptureRole::PostEvent)
        .unwrap()
        .unwrap();
    assert_eq!(found.id, tied.id);
    assert!(tied.id > latest.id);

    let pre = tracker
        .get_latest_snapshot(url.id, CaptureRole::PreEvent)
        .unwrap()
        .unwrap();
    assert_eq!(pre.body, "random body 5");
}

#[test]
fn find_all_is_ordered_by_capture_time() {
    let tracker = tracker();
    let url = tracker.add_url("https://example.com").unwrap();
    let late = tracker
        .record_snapshot(url.id, CaptureRole::PreEvent, "late", at(50))
        .unwrap();
    let early = tracker
        .record_snapshot(url.id, CaptureRole::PostEvent, "early", at(10))
        .unwrap();
    let all = tracker.catalog().find_all(url.id).unwrap();
    assert_eq!(all, vec![early, late]);
}

#[test]
fn compare_latest_requires_both_roles() {
    let tracker = tracker();
    let url = tracker.add_url("https://example.com").unwrap();
    tracker
        .record_snapshot(url.id, CaptureRole::PreEvent, "only before", at(1))
        .unwrap();
    let err = tracker.compare_latest(url.id).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(tracker.store().list_diff_results(url.id).unwrap().is_empty());
}

#[test]
fn store_survives_reopen_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("pagediff.db");
    let result_id = {
        let tracker = DiffTracker::new(StorageEngine::open(&path).unwrap(), DiffEngine::default());
        let (_, _, _) = seeded(&tracker);
        let url = tracker.store().list_urls().unwrap().remove(0);
        let result: DiffResult = tracker.compare_latest(url.id).unwrap();
        result.id.unwrap()
    };
    let reopened = StorageEngine::open(&path).unwrap();
    let loaded = reopened.load_diff_result(result_id).unwrap().unwrap();
    assert_eq!(loaded.snapshots.len(), 2);
    assert_eq!(loaded.delta_count(), 2);
}
