/*!
Two-tier result cache: a bounded in-memory LRU in front of the
[`DurableStore`]'s `check_results` table.

`get`/`add` share one lock so at most one decision is ever in flight for a
given fingerprint. `has`/`has_non_empty`/`len` are cheap, independent
reads: `has` never touches the store or even the LRU (it is answered
purely from `known_keys`), and `len` is a plain counter read. `spec.md`
§4.2 calls these "lock-free fast paths" and explicitly tolerates a `has`
that returns `false` immediately after a concurrent `add` landed — Rust's
aliasing rules mean `has_non_empty` still takes a short, normally
uncontended lock on the LRU itself (there is no way to read a `HashMap`
without *some* synchronization), but it never blocks on the same lock
`get`/`add` serialize through.
*/

mod error;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use tracing::instrument;

pub use error::CacheError;

use crate::record::CheckResult;
use crate::store::DurableStore;

type Result<T> = std::result::Result<T, CacheError>;

/// Default hot-tier capacity, matching `original_source`'s
/// `PersistentResultCache(memory_cache_size=10000)` default.
pub const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Two-tier fingerprint -> result cache. `None` in the LRU slot means a
/// placeholder ("scheduled/in-flight, do not re-enqueue"); `Some(result)`
/// is a completed outcome.
pub struct ResultCache {
    store: Arc<DurableStore>,
    lru: Mutex<LruCache<String, Option<CheckResult>>>,
    known_keys: RwLock<FxHashSet<String>>,
    result_count: AtomicI64,
}

impl ResultCache {
    /// Build a cache fronting `store`, hydrating `known_keys` from every
    /// fingerprint already on disk (placeholders included) so `has()`
    /// cannot trail a warm store with a cold process restart.
    #[instrument(skip(store))]
    pub fn new(store: Arc<DurableStore>, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity.max(1) is nonzero");
        let known_keys = store.all_fingerprints()?.into_iter().collect();
        let result_count = store.result_count()?;
        Ok(Self {
            store,
            lru: Mutex::new(LruCache::new(capacity)),
            known_keys: RwLock::new(known_keys),
            result_count: AtomicI64::new(result_count),
        })
    }

    /// Completed result for `fp`, or `None` if absent or still a
    /// placeholder. Consults the LRU first; on a cold-tier hit, promotes
    /// the decoded result into the LRU.
    pub fn get(&self, fp: &str) -> Result<Option<CheckResult>> {
        let mut lru = self.lru.lock();
        if let Some(slot) = lru.get(fp) {
            return Ok(slot.clone());
        }
        // Hold the lock across the cold-tier read and the promote-back so a
        // concurrent `add` can't land in between and get silently reverted
        // by our own (now-stale) promotion.
        match self.store.get_result(fp)? {
            Some(result) => {
                lru.put(fp.to_string(), Some(result.clone()));
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Add a result for `fp`. `value = None` installs a placeholder;
    /// `value = Some(result)` records a completed outcome. Guards against
    /// the double-count bug named in `spec.md` §4.2: a second real `add`
    /// for a fingerprint that already has a real result does not
    /// increment `result_count` again.
    #[instrument(skip(self, value))]
    pub fn add(&self, fp: &str, value: Option<CheckResult>) -> Result<()> {
        self.known_keys.write().insert(fp.to_string());
        match value {
            None => {
                self.store.add_result(fp, None)?;
                self.lru.lock().put(fp.to_string(), None);
            }
            Some(result) => {
                let was_real = self.has_non_empty(fp)?.is_some();
                self.store.add_result(fp, Some(&result))?;
                self.lru.lock().put(fp.to_string(), Some(result));
                if !was_real {
                    self.result_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// O(1) presence check (placeholder or real). Racy with respect to a
    /// concurrent `add`, by design (see module docs).
    pub fn has(&self, fp: &str) -> bool {
        self.known_keys.read().contains(fp)
    }

    /// Completed result for `fp`, or `None` for "absent" *or*
    /// "placeholder" — i.e. "is there real data". Unlike `get`, a cold-tier
    /// hit is not promoted into the LRU (matching `original_source`'s
    /// `has_non_empty_result`, which only peeks).
    pub fn has_non_empty(&self, fp: &str) -> Result<Option<CheckResult>> {
        if let Some(slot) = self.lru.lock().peek(fp) {
            return Ok(slot.clone());
        }
        Ok(self.store.get_result(fp)?)
    }

    /// Number of real (non-placeholder) results. Backed by a counter, not
    /// a scan.
    pub fn len(&self) -> i64 {
        self.result_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
