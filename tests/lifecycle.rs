use std::collections::BTreeMap;

use linkcheck_store::{LifecycleConfig, LifecycleCoordinator, RunOutcome};

fn config(dir: &tempfile::TempDir, resume: bool, persist: bool) -> LifecycleConfig {
    LifecycleConfig {
        persist,
        resume,
        cache_db: dir.path().join("run.sqlite3"),
        max_urls: Some(1000),
        recursion_level: 2,
        check_extern: true,
        extra: BTreeMap::new(),
    }
}

#[test]
fn fresh_start_creates_an_empty_store_with_zero_pending_work() {
    let dir = tempfile::tempdir().expect("tempdir");
    let coordinator = LifecycleCoordinator::new(config(&dir, false, false));
    let outcome = coordinator.start(64).expect("start");
    assert_eq!(outcome.initial_unfinished, 0);
    assert_eq!(outcome.initial_sqlite_pending, 0);
    assert_eq!(outcome.cache.len(), 0);
}

#[test]
fn completed_run_deletes_the_database_regardless_of_persist() {
    for persist in [false, true] {
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = LifecycleCoordinator::new(config(&dir, false, persist));
        let outcome = coordinator.start(64).expect("start");
        let path = outcome.store.path().to_path_buf();
        assert!(path.exists());

        coordinator
            .teardown(&outcome.store, RunOutcome::Completed)
            .expect("teardown");
        assert!(!path.exists(), "persist={persist} must not prevent deletion on completion");
    }
}

#[test]
fn interrupted_run_always_retains_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let coordinator = LifecycleCoordinator::new(config(&dir, false, false));
    let outcome = coordinator.start(64).expect("start");
    let path = outcome.store.path().to_path_buf();

    coordinator
        .teardown(&outcome.store, RunOutcome::Interrupted)
        .expect("teardown");
    assert!(path.exists());
}

#[test]
fn resume_recovers_in_progress_rows_left_by_a_crashed_run() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let coordinator = LifecycleCoordinator::new(config(&dir, false, true));
        let outcome = coordinator.start(64).expect("fresh start");
        let rec = linkcheck_store::UrlRecord::new(
            "https://example.test/a",
            Some("fp-a".to_string()),
        );
        outcome.store.enqueue(&rec).expect("enqueue");
        outcome.store.dequeue(10).expect("simulate a worker picking it up");
        // Process "crashes" here without calling teardown; the row stays
        // in_progress and the database is never deleted.
    }

    let coordinator = LifecycleCoordinator::new(config(&dir, true, true));
    let outcome = coordinator.start(64).expect("resume");
    assert_eq!(outcome.initial_unfinished, 1);
    assert_eq!(outcome.initial_sqlite_pending, 1);

    let stats = outcome.store.queue_stats().expect("stats");
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.in_progress, 0);
}
