/*!
Start-up and teardown orchestration: decide whether a run starts fresh or
resumes, reconcile in-flight work left over from a prior crash, and decide
at the end whether the durable database earns its keep or gets deleted.

Grounded in the same "fresh vs. resume" split the teacher's checkpointer
uses around thread/session identity, generalized here to a single-process
run rather than a per-session key (`spec.md` §4.4).
*/

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};

pub use error::LifecycleError;

use crate::cache::ResultCache;
use crate::record::ConfigSnapshot;
use crate::store::DurableStore;

type Result<T> = std::result::Result<T, LifecycleError>;

/// Metadata key the config snapshot is stored under.
const CONFIG_SNAPSHOT_KEY: &str = "run_config";

/// Keys compared for drift on resume. Deliberately excludes `maxnumurls`,
/// matching `original_source`'s resume check exactly (see DESIGN.md).
const DRIFT_KEYS: &[&str] = &["recursionlevel", "checkextern"];

/// Configuration inputs consumed at start-up (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Accepted for parity with `spec.md` §6's configuration surface.
    /// `original_source` only reads this to choose between a SQLite-backed
    /// and an in-memory aggregate (`get_aggregate`); this crate builds only
    /// the SQLite-backed Durable Store, so there is no alternative backend
    /// for it to select, and it plays no part in [`LifecycleCoordinator::teardown`]'s
    /// delete-vs-retain decision (see DESIGN.md).
    pub persist: bool,
    pub resume: bool,
    pub cache_db: PathBuf,
    pub max_urls: Option<i64>,
    pub recursion_level: i64,
    pub check_extern: bool,
    /// Opaque pass-through fields stashed in the snapshot alongside the
    /// three named keys above.
    pub extra: ConfigSnapshot,
}

/// How a run ended, decided by the caller and handed to [`LifecycleCoordinator::teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Crawl finished on its own; nothing left to resume.
    Completed,
    /// Cancelled, paused, or aborted; the database should survive so a
    /// later run can pick it back up.
    Interrupted,
}

/// Everything a caller needs to build the rest of the pipeline after
/// start-up: the opened store, a warmed result cache, and the counters a
/// [`crate::queue::HybridQueue`] should be seeded with.
pub struct StartOutcome {
    pub store: Arc<DurableStore>,
    pub cache: Arc<ResultCache>,
    pub initial_unfinished: i64,
    pub initial_sqlite_pending: i64,
}

pub struct LifecycleCoordinator {
    config: LifecycleConfig,
}

impl LifecycleCoordinator {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Fresh run: wipe any pre-existing database and start empty. Resume:
    /// open the existing one, warn on config drift, and recover records
    /// left `in_progress` by a prior crash.
    #[instrument(skip(self), fields(cache_db = %self.config.cache_db.display(), resume = self.config.resume))]
    pub fn start(&self, cache_capacity: usize) -> Result<StartOutcome> {
        if !self.config.resume {
            remove_db_files(&self.config.cache_db)?;
        }
        let store = Arc::new(DurableStore::open(&self.config.cache_db)?);

        if self.config.resume {
            if let Some(previous) = store.get_metadata(CONFIG_SNAPSHOT_KEY)? {
                let previous: ConfigSnapshot = serde_json::from_value(previous)?;
                log_drift(&previous, &self.snapshot());
            }
            let reset = store.reset_in_progress()?;
            let stats = store.queue_stats()?;
            info!(
                reset_rows = reset,
                pending = stats.pending,
                in_progress = stats.in_progress,
                done = stats.done,
                skipped = stats.skipped,
                "resume stats"
            );
        }

        store.set_metadata(
            CONFIG_SNAPSHOT_KEY,
            &serde_json::to_value(self.snapshot())?,
        )?;

        let cache = Arc::new(ResultCache::new(store.clone(), cache_capacity)?);
        let stats = store.queue_stats()?;
        Ok(StartOutcome {
            store,
            cache,
            initial_unfinished: stats.pending + stats.in_progress,
            initial_sqlite_pending: stats.pending,
        })
    }

    /// Delete the database on natural completion; retain it (and tell the
    /// user how to resume) on any other outcome. Unconditional either way —
    /// `persist` plays no part in this decision (see DESIGN.md).
    #[instrument(skip(self, store))]
    pub fn teardown(&self, store: &DurableStore, outcome: RunOutcome) -> Result<()> {
        match outcome {
            RunOutcome::Completed => {
                store.delete_db()?;
                info!(path = %self.config.cache_db.display(), "run completed; durable database removed");
            }
            RunOutcome::Interrupted => {
                store.close();
                warn!(
                    path = %self.config.cache_db.display(),
                    "run interrupted; durable database retained — rerun with resume=true to continue"
                );
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> ConfigSnapshot {
        let mut snapshot = self.config.extra.clone();
        snapshot.insert("recursionlevel".to_string(), json!(self.config.recursion_level));
        snapshot.insert("checkextern".to_string(), json!(self.config.check_extern));
        snapshot.insert("maxnumurls".to_string(), json!(self.config.max_urls));
        snapshot
    }
}

fn log_drift(previous: &ConfigSnapshot, current: &ConfigSnapshot) {
    for key in DRIFT_KEYS {
        let prev_val = previous.get(*key);
        let cur_val = current.get(*key);
        if prev_val != cur_val {
            warn!(
                key = %key,
                previous = ?prev_val,
                current = ?cur_val,
                "resumed run's configuration differs from the one the durable database was built with"
            );
        }
    }
}

fn remove_db_files(path: &Path) -> Result<()> {
    if path.as_os_str() == ":memory:" {
        return Ok(());
    }
    for suffix in ["", "-wal", "-shm"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            std::fs::remove_file(&candidate).map_err(crate::store::StoreError::Io)?;
        }
    }
    Ok(())
}
