/*!
Bounded-memory FIFO queue that transparently spills to, and reloads from,
the [`DurableStore`], coordinates producers and consumers, and tracks task
completion.

Concurrency follows `spec.md` §5 and §9's explicit "one mutex, two
condition variables" design: a single `parking_lot::Mutex<QueueState>`
guards all bookkeeping, with `not_empty` signalling a consumer that a
record became available and `all_tasks_done` signalling a joiner that
`unfinished` reached zero. Store operations run while holding that mutex
(matching `spec.md` §5's explicit choice), trading a little throughput for
never having to reconcile a torn view of `sqlite_pending`/`unfinished`
against the database.
*/

mod error;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::instrument;

pub use error::{QueueError, RebuildError};

use crate::cache::ResultCache;
use crate::record::UrlRecord;
use crate::store::{DurableStore, StoredUrlRow};

type Result<T> = std::result::Result<T, QueueError>;

/// Injected hook that reconstructs a full domain [`UrlRecord`] from a
/// stored row. The queue cannot do this itself: that requires crawler
/// context (base url resolution, content-type negotiation, ...) this
/// crate doesn't have (`spec.md` §6).
pub type Rebuilder = dyn Fn(&StoredUrlRow) -> std::result::Result<UrlRecord, RebuildError> + Send + Sync;

/// Tuning constants, `spec.md` §4.3. All reconfigurable; defaults match
/// the spec's named values.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Memory FIFO cap for new (unsolved) items.
    pub memory_buffer_size: usize,
    /// Batch size pulled from the store when memory drains.
    pub batch_load_size: usize,
    /// Overflow-staging size that triggers a flush to disk.
    pub overflow_check_interval: usize,
    /// Optional hard cap on total URLs ever accepted by `put`. `None` is
    /// unbounded.
    pub max_urls: Option<i64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            memory_buffer_size: 5000,
            batch_load_size: 500,
            overflow_check_interval: 100,
            max_urls: None,
        }
    }
}

/// Point-in-time counters, mostly useful for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub finished: i64,
    pub in_progress: i64,
    pub unfinished: i64,
    pub sqlite_pending: i64,
}

struct QueueState {
    memory: VecDeque<UrlRecord>,
    overflow: Vec<UrlRecord>,
    shutdown: bool,
    remaining_quota: Option<i64>,
    finished: i64,
    in_progress: i64,
    unfinished: i64,
    sqlite_pending: i64,
}

pub struct HybridQueue {
    store: Arc<DurableStore>,
    cache: Arc<ResultCache>,
    rebuilder: Box<Rebuilder>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    all_tasks_done: Condvar,
}

impl HybridQueue {
    /// `initial_unfinished`/`initial_sqlite_pending` seed the counters from
    /// whatever the [`crate::lifecycle::LifecycleCoordinator`] found on
    /// disk at resume time (typically both equal to the pending +
    /// in_progress row count after `reset_in_progress`).
    pub fn new(
        store: Arc<DurableStore>,
        cache: Arc<ResultCache>,
        rebuilder: Box<Rebuilder>,
        config: QueueConfig,
        initial_unfinished: i64,
        initial_sqlite_pending: i64,
    ) -> Self {
        let remaining_quota = config.max_urls;
        Self {
            store,
            cache,
            rebuilder,
            config,
            state: Mutex::new(QueueState {
                memory: VecDeque::new(),
                overflow: Vec::new(),
                shutdown: false,
                remaining_quota,
                finished: 0,
                in_progress: 0,
                unfinished: initial_unfinished,
                sqlite_pending: initial_sqlite_pending,
            }),
            not_empty: Condvar::new(),
            all_tasks_done: Condvar::new(),
        }
    }

    /// See `spec.md` §4.3's put contract.
    #[instrument(skip(self, rec), fields(url = %rec.url))]
    pub fn put(&self, rec: UrlRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Ok(());
        }
        if matches!(state.remaining_quota, Some(q) if q <= 0) {
            return Ok(());
        }
        if let Some(fp) = rec.fingerprint.as_deref() {
            if self.cache.has(fp) {
                return Ok(());
            }
        }

        if rec.is_synthetic() {
            // The placeholder add applies to every accepted record, synthetic
            // or not (`spec.md` §4.3 step 5 sits between the branch split and
            // the `unfinished` increment, which runs for both branches) — a
            // synthetic record carrying a real fingerprint still needs one so
            // a later non-synthetic `put` for the same fingerprint is
            // suppressed.
            if let Some(fp) = rec.fingerprint.as_deref() {
                self.cache.add(fp, None)?;
            }
            state.memory.push_front(rec);
            state.unfinished += 1;
            drop(state);
            self.not_empty.notify_one();
            return Ok(());
        }

        let fp = rec.fingerprint.clone().ok_or_else(|| {
            QueueError::InvariantViolation("non-synthetic put is missing a fingerprint".into())
        })?;

        if let Some(quota) = state.remaining_quota.as_mut() {
            *quota -= 1;
        }
        if state.memory.len() < self.config.memory_buffer_size {
            state.memory.push_back(rec);
        } else {
            state.overflow.push(rec);
            if state.overflow.len() >= self.config.overflow_check_interval {
                flush_overflow(&self.store, &mut state)?;
            }
        }
        self.cache.add(&fp, None)?;
        state.unfinished += 1;
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocking get with an optional timeout. `None` blocks forever;
    /// `Some(d)` returns [`QueueError::Empty`] if nothing arrives within
    /// `d` (the python `queue.Empty` analogue named in `spec.md` §7).
    #[instrument(skip(self))]
    pub fn get(&self, timeout: Option<Duration>) -> Result<UrlRecord> {
        let mut state = self.state.lock();
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if state.memory.is_empty() && !state.overflow.is_empty() {
                flush_overflow(&self.store, &mut state)?;
            }
            if state.memory.is_empty() && state.sqlite_pending > 0 {
                self.load_batch_locked(&mut state)?;
            }
            if let Some(rec) = state.memory.pop_front() {
                state.in_progress += 1;
                return Ok(rec);
            }
            match deadline {
                None => {
                    self.not_empty.wait(&mut state);
                }
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return Err(QueueError::Empty);
                    }
                    self.not_empty.wait_for(&mut state, dl - now);
                }
            }
        }
    }

    /// Mark a dequeued record's task complete. If it carries a store
    /// row-id (it was reloaded from disk), the corresponding row is marked
    /// `done`. Panics if `unfinished` would go negative — `spec.md` §7
    /// classes this as a fatal programmer error, not a recoverable one.
    #[instrument(skip(self, rec), fields(url = %rec.url))]
    pub fn task_done(&self, rec: &UrlRecord) -> Result<()> {
        if let Some(row_id) = rec.store_row_id {
            self.store.mark_done(row_id)?;
        }
        let mut state = self.state.lock();
        state.finished += 1;
        state.in_progress -= 1;
        state.unfinished -= 1;
        if state.unfinished < 0 {
            drop(state);
            panic!(
                "{}",
                QueueError::InvariantViolation(
                    "task_done called more times than there was outstanding work".into()
                )
            );
        }
        if state.unfinished == 0 {
            self.all_tasks_done.notify_all();
        }
        Ok(())
    }

    /// Block until `unfinished == 0`, or until `timeout` elapses.
    pub fn join(&self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.state.lock();
        match timeout {
            None => {
                while state.unfinished > 0 {
                    self.all_tasks_done.wait(&mut state);
                }
                Ok(())
            }
            Some(d) => {
                let deadline = Instant::now() + d;
                while state.unfinished > 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Timeout);
                    }
                    let result = self.all_tasks_done.wait_for(&mut state, deadline - now);
                    if result.timed_out() && state.unfinished > 0 {
                        return Err(QueueError::Timeout);
                    }
                }
                Ok(())
            }
        }
    }

    /// Flush overflow, persist every remaining in-memory item, and set a
    /// shutdown flag so further `put`s are dropped. See `spec.md` §4.3 and
    /// §9 for the post-shutdown `unfinished` arithmetic.
    #[instrument(skip(self))]
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.shutdown = true;
        flush_overflow(&self.store, &mut state)?;
        let remaining: Vec<UrlRecord> = state.memory.drain(..).collect();
        state.overflow.extend(remaining);
        flush_overflow(&self.store, &mut state)?;

        let previous_unfinished = state.unfinished;
        let sqlite_pending_after = state.sqlite_pending;
        debug_assert!(
            sqlite_pending_after <= previous_unfinished,
            "shutdown arithmetic invariant violated: sqlite_pending_after_persist ({sqlite_pending_after}) \
             exceeds unfinished ({previous_unfinished}) — some persisted item was not counted as \
             unfinished exactly once"
        );
        state.unfinished = (previous_unfinished - sqlite_pending_after).max(0);
        self.all_tasks_done.notify_all();
        Ok(())
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.state.lock();
        QueueCounts {
            finished: state.finished,
            in_progress: state.in_progress,
            unfinished: state.unfinished,
            sqlite_pending: state.sqlite_pending,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    fn load_batch_locked(&self, state: &mut QueueState) -> Result<()> {
        let rows = self.store.dequeue(self.config.batch_load_size)?;
        for row in rows {
            state.sqlite_pending -= 1;
            let cache_hit = match row.fingerprint.as_deref() {
                Some(fp) => self.cache.has_non_empty(fp)?.is_some(),
                None => false,
            };
            if cache_hit {
                self.store.mark_done(row.id)?;
                state.unfinished -= 1;
                debug_assert!(
                    state.unfinished >= 0,
                    "unfinished went negative finalizing a cache-hit row on reload"
                );
                continue;
            }
            match (self.rebuilder)(&row) {
                Ok(mut rec) => {
                    rec.store_row_id = Some(row.id);
                    state.memory.push_back(rec);
                }
                Err(err) => {
                    tracing::warn!(row_id = row.id, url = %row.url, error = %err, "dropping row: rebuild failed");
                }
            }
        }
        Ok(())
    }
}

fn flush_overflow(store: &DurableStore, state: &mut QueueState) -> Result<()> {
    if state.overflow.is_empty() {
        return Ok(());
    }
    let batch: Vec<UrlRecord> = state.overflow.drain(..).collect();
    let added = store.enqueue_batch(&batch)?;
    state.sqlite_pending += added as i64;
    Ok(())
}
