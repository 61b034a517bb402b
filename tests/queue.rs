use std::sync::Arc;
use std::time::Duration;

use linkcheck_store::{
    CheckResult, DurableStore, HybridQueue, QueueConfig, QueueError, RebuildError, ResultCache,
    StoredUrlRow, UrlRecord, Validity,
};

fn echo_rebuilder() -> Box<dyn Fn(&StoredUrlRow) -> Result<UrlRecord, RebuildError> + Send + Sync> {
    Box::new(|row: &StoredUrlRow| Ok(UrlRecord::new(row.url.clone(), row.fingerprint.clone())))
}

fn build(config: QueueConfig) -> (tempfile::TempDir, Arc<DurableStore>, HybridQueue) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("queue.sqlite3");
    let store = Arc::new(DurableStore::open(&path).expect("open store"));
    let cache = Arc::new(ResultCache::new(store.clone(), 1024).expect("cache"));
    let queue = HybridQueue::new(store.clone(), cache, echo_rebuilder(), config, 0, 0);
    (dir, store, queue)
}

#[test]
fn put_get_task_done_roundtrip() {
    let (_dir, _store, queue) = build(QueueConfig::default());
    let rec = UrlRecord::new("https://example.test/a", Some("fp-a".into()));
    queue.put(rec).expect("put");

    let got = queue.get(Some(Duration::from_secs(1))).expect("get");
    assert_eq!(got.url, "https://example.test/a");
    assert_eq!(queue.counts().in_progress, 1);

    queue.task_done(&got).expect("task_done");
    assert_eq!(queue.counts().in_progress, 0);
    assert_eq!(queue.counts().finished, 1);

    queue.join(Some(Duration::from_secs(1))).expect("join");
}

#[test]
fn duplicate_fingerprint_is_suppressed() {
    let (_dir, _store, queue) = build(QueueConfig::default());
    let a = UrlRecord::new("https://example.test/a", Some("fp-a".into()));
    let b = UrlRecord::new("https://example.test/a-mirror", Some("fp-a".into()));
    queue.put(a).expect("first put");
    queue.put(b).expect("duplicate put is silently dropped");

    let got = queue.get(Some(Duration::from_millis(50))).expect("get");
    assert_eq!(got.url, "https://example.test/a");
    assert!(matches!(
        queue.get(Some(Duration::from_millis(50))),
        Err(QueueError::Empty)
    ));
}

#[test]
fn synthetic_record_is_observed_before_queued_work() {
    let (_dir, _store, queue) = build(QueueConfig::default());
    queue
        .put(UrlRecord::new(
            "https://example.test/queued",
            Some("fp-queued".into()),
        ))
        .expect("put queued");

    let mut synthetic = UrlRecord::new("https://example.test/synthetic", None);
    let mut result = CheckResult::placeholder("https://example.test/synthetic");
    result.valid = Validity::Valid(true);
    synthetic.inline_result = Some(result);
    queue.put(synthetic).expect("put synthetic");

    let first = queue.get(Some(Duration::from_millis(50))).expect("get");
    assert_eq!(first.url, "https://example.test/synthetic");
    assert!(first.is_synthetic());
}

#[test]
fn get_times_out_with_empty_when_nothing_available() {
    let (_dir, _store, queue) = build(QueueConfig::default());
    let result = queue.get(Some(Duration::from_millis(20)));
    assert!(matches!(result, Err(QueueError::Empty)));
}

#[test]
fn overflow_spills_to_disk_and_reloads_through_the_rebuilder() {
    let config = QueueConfig {
        memory_buffer_size: 1,
        batch_load_size: 10,
        overflow_check_interval: 2,
        max_urls: None,
    };
    let (_dir, store, queue) = build(config);

    for i in 0..5 {
        queue
            .put(UrlRecord::new(
                format!("https://example.test/{i}"),
                Some(format!("fp-{i}")),
            ))
            .expect("put");
    }

    // With a buffer of 1, most records went through overflow -> disk.
    let stats = store.queue_stats().expect("stats");
    assert!(stats.pending > 0, "expected overflow to reach the store");

    let mut seen = Vec::new();
    for _ in 0..5 {
        let rec = queue.get(Some(Duration::from_secs(1))).expect("get");
        seen.push(rec.url.clone());
        queue.task_done(&rec).expect("task_done");
    }
    seen.sort();
    let expected: Vec<String> = (0..5).map(|i| format!("https://example.test/{i}")).collect();
    assert_eq!(seen, expected);
    queue.join(Some(Duration::from_secs(1))).expect("join");
}

#[test]
fn reload_skips_records_already_cache_hit_without_surfacing_them() {
    let config = QueueConfig {
        memory_buffer_size: 0,
        batch_load_size: 10,
        overflow_check_interval: 1,
        max_urls: None,
    };
    let (_dir, store, queue) = build(config);
    queue
        .put(UrlRecord::new("https://example.test/a", Some("fp-a".into())))
        .expect("put");

    // Simulate the fingerprint having acquired a real result out from under
    // the queue (e.g. a synthetic record handled it) before reload.
    let mut result = CheckResult::placeholder("https://example.test/a");
    result.valid = Validity::Valid(true);
    store.add_result("fp-a", Some(&result)).expect("seed real result");

    let before = queue.counts();
    let outcome = queue.get(Some(Duration::from_millis(100)));
    assert!(matches!(outcome, Err(QueueError::Empty)));
    let after = queue.counts();
    assert_eq!(after.unfinished, before.unfinished - 1);
}

#[test]
fn shutdown_persists_remaining_memory_and_blocks_further_puts() {
    let (_dir, store, queue) = build(QueueConfig::default());
    queue
        .put(UrlRecord::new("https://example.test/a", Some("fp-a".into())))
        .expect("put");
    queue.shutdown().expect("shutdown");

    assert!(queue.is_shutdown());
    queue
        .put(UrlRecord::new("https://example.test/b", Some("fp-b".into())))
        .expect("put after shutdown is a silent no-op");

    let stats = store.queue_stats().expect("stats");
    assert_eq!(stats.pending, 1, "only the pre-shutdown record persists");
}

#[test]
fn task_done_called_too_many_times_is_a_fatal_programmer_error() {
    let (_dir, _store, queue) = build(QueueConfig::default());
    let rec = UrlRecord::new("https://example.test/a", Some("fp-a".into()));
    queue.put(rec).expect("put");
    let got = queue.get(Some(Duration::from_secs(1))).expect("get");
    queue.task_done(&got).expect("first task_done");

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        queue.task_done(&got).ok();
    }));
    assert!(result.is_err(), "a second task_done must panic");
}
