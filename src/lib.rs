/*!
Durable work queue and result cache core for a multi-threaded
link-checking crawler.

Four pieces, each usable on its own:

- [`store`] — a SQLite-backed key/value and queue store: the single
  source of truth for anything that must survive a crash.
- [`cache`] — a two-tier (in-memory LRU + durable) fingerprint -> result
  cache used for duplicate suppression.
- [`queue`] — a bounded in-memory FIFO that overflows to, and reloads
  from, the store, coordinating producer/consumer threads.
- [`lifecycle`] — start-up (fresh vs. resume) and teardown (delete vs.
  retain) orchestration tying the above together.

This crate does not crawl anything itself: no HTTP client, no HTML
parsing, no URL resolution. It is the persistence and flow-control core a
crawler is built around.
*/

pub mod cache;
pub mod lifecycle;
pub mod queue;
pub mod record;
pub mod store;
mod util;

pub use cache::{CacheError, ResultCache, DEFAULT_CACHE_SIZE};
pub use lifecycle::{LifecycleConfig, LifecycleCoordinator, LifecycleError, RunOutcome, StartOutcome};
pub use queue::{HybridQueue, QueueConfig, QueueCounts, QueueError, Rebuilder, RebuildError};
pub use record::{CheckResult, ConfigSnapshot, RecordStatus, UrlRecord, Validity};
pub use store::{DurableStore, QueueStats, StoreError, StoredUrlRow};
