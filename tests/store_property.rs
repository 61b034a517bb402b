//! Property tests for the two invariants `spec.md` §8 calls out explicitly:
//! the warnings-as-ordered-pairs round-trip, and `add(k, None)` followed by
//! `add(k, Some(real))` always settling on the real result.

use std::sync::Arc;

use linkcheck_store::{CheckResult, DurableStore, ResultCache, Validity};
use proptest::prelude::*;

fn warnings_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        (
            proptest::string::string_regex("[A-Za-z0-9_-]{0,12}").unwrap(),
            proptest::string::string_regex("[A-Za-z0-9 _.-]{0,40}").unwrap(),
        ),
        0..8,
    )
}

fn fingerprint_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("fp-[a-z0-9]{1,12}").unwrap()
}

fn real_result(url: &str, warnings: Vec<(String, String)>) -> CheckResult {
    let mut result = CheckResult::placeholder(url);
    result.valid = Validity::Valid(true);
    result.warnings = warnings;
    result
}

proptest! {
    /// `warnings` must survive the store's JSON encoding as ordered pairs,
    /// not be flattened or reordered (`store/rows.rs`'s `insert_result`/
    /// `get_result`).
    #[test]
    fn prop_warnings_round_trip_through_the_durable_store(
        fp in fingerprint_strategy(),
        warnings in warnings_strategy(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path().join("prop.sqlite3")).unwrap();
        let result = real_result("https://example.test/prop", warnings.clone());
        store.add_result(&fp, Some(&result)).unwrap();

        let back = store.get_result(&fp).unwrap().expect("result was just persisted");
        prop_assert_eq!(back.warnings, warnings);
    }

    /// For any fingerprint: `add(k, None)` then `add(k, Some(real))`, in
    /// that order, always leaves `get(k)` returning the real result —
    /// never the placeholder, regardless of what the placeholder's own
    /// (never-surfaced) fields look like.
    #[test]
    fn prop_placeholder_then_real_add_settles_on_the_real_result(
        fp in fingerprint_strategy(),
        warnings in warnings_strategy(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DurableStore::open(dir.path().join("prop.sqlite3")).unwrap());
        let cache = ResultCache::new(store, 64).unwrap();
        let result = real_result("https://example.test/prop", warnings);

        cache.add(&fp, None).unwrap();
        cache.add(&fp, Some(result.clone())).unwrap();

        prop_assert_eq!(cache.get(&fp).unwrap(), Some(result));
    }
}
