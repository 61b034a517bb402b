use std::sync::Arc;

use linkcheck_store::{CheckResult, DurableStore, ResultCache, Validity};

fn temp_cache(capacity: usize) -> (tempfile::TempDir, Arc<DurableStore>, ResultCache) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cache.sqlite3");
    let store = Arc::new(DurableStore::open(&path).expect("open store"));
    let cache = ResultCache::new(store.clone(), capacity).expect("new cache");
    (dir, store, cache)
}

fn real_result(url: &str) -> CheckResult {
    let mut result = CheckResult::placeholder(url);
    result.valid = Validity::Valid(true);
    result.result = "OK".into();
    result
}

#[test]
fn placeholder_add_is_visible_via_has_but_not_has_non_empty() {
    let (_dir, _store, cache) = temp_cache(16);
    cache.add("fp-a", None).expect("placeholder");
    assert!(cache.has("fp-a"));
    assert!(cache.has_non_empty("fp-a").expect("query").is_none());
    assert_eq!(cache.len(), 0);
}

#[test]
fn real_add_increments_len_exactly_once_per_fingerprint() {
    let (_dir, _store, cache) = temp_cache(16);
    cache.add("fp-a", None).expect("placeholder");
    cache
        .add("fp-a", Some(real_result("https://example.test/a")))
        .expect("promote to real");
    assert_eq!(cache.len(), 1);

    // A second real add for the same fingerprint must not double count.
    cache
        .add("fp-a", Some(real_result("https://example.test/a")))
        .expect("re-add same fingerprint");
    assert_eq!(cache.len(), 1);
}

#[test]
fn get_promotes_a_cold_tier_hit_into_the_hot_tier() {
    let (_dir, store, cache) = temp_cache(16);
    store
        .add_result("fp-a", Some(&real_result("https://example.test/a")))
        .expect("seed store directly, bypassing the cache");

    // Not yet known to this cache instance's LRU or known_keys.
    let fetched = cache.get("fp-a").expect("get").expect("present");
    assert_eq!(fetched.result, "OK");
}

#[test]
fn construction_hydrates_known_keys_from_existing_store_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cache.sqlite3");
    let store = Arc::new(DurableStore::open(&path).expect("open store"));
    store.add_result("fp-a", None).expect("placeholder");
    store
        .add_result("fp-b", Some(&real_result("https://example.test/b")))
        .expect("real result");

    // A brand new cache instance, as if the process restarted.
    let cache = ResultCache::new(store.clone(), 16).expect("new cache");
    assert!(cache.has("fp-a"));
    assert!(cache.has("fp-b"));
    assert_eq!(cache.len(), 1);
}

#[test]
fn lru_eviction_does_not_lose_known_keys_or_result_count() {
    let (_dir, _store, cache) = temp_cache(2);
    for i in 0..5 {
        let fp = format!("fp-{i}");
        cache
            .add(&fp, Some(real_result(&format!("https://example.test/{i}"))))
            .expect("add");
    }
    // LRU capacity is 2, but every fingerprint was a distinct real result.
    assert_eq!(cache.len(), 5);
    for i in 0..5 {
        assert!(cache.has(&format!("fp-{i}")));
    }
    // An evicted entry still round-trips through the cold tier.
    let fetched = cache.get("fp-0").expect("get").expect("present");
    assert_eq!(fetched.result, "OK");
}
