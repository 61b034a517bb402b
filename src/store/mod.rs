/*!
Durable SQLite-backed storage for the URL queue, the result cache's cold
tier, and a small run-metadata map.

## Design

- Sole owner of persistent state. Writes are serialized through a single
  connection guarded by a mutex; reads use their own thread-local
  connection and rely on SQLite's WAL mode to stay off the write path.
- Each worker thread lazily opens (and keeps) its own connection the first
  time it touches the store. A central registry of those connections lets
  [`DurableStore::close`] dispose all of them, including ones opened by
  threads that have since exited.
- Unique-key conflicts on `enqueue`/`enqueue_batch`/placeholder
  `add_result` are not errors: they mean "already present", and the caller
  decides what to do with that (see `spec.md` §4.1, §7).

## Schema

Three tables: `run_metadata`, `url_queue`, `check_results`, created inline
on construction (see `SCHEMA_SQL`) rather than through an external
migration runner, since there is a single schema version to manage
(SPEC_FULL.md §4.1).
*/

mod error;
mod rows;
mod schema;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::instrument;

pub use error::StoreError;
pub use rows::StoredUrlRow;

use crate::record::{CheckResult, RecordStatus, UrlRecord};

type Result<T> = std::result::Result<T, StoreError>;

/// Counts grouped by [`RecordStatus`], as returned by [`DurableStore::queue_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: i64,
    pub in_progress: i64,
    pub done: i64,
    pub skipped: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.in_progress + self.done + self.skipped
    }
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Per-thread connections, keyed by the owning store's id. A thread
    /// touching two different stores gets two distinct connections.
    static TLS_CONNECTIONS: RefCell<HashMap<u64, Arc<Mutex<Connection>>>> =
        RefCell::new(HashMap::new());
}

/// Thread-safe persistent key/value and queue store over SQLite.
pub struct DurableStore {
    id: u64,
    path: PathBuf,
    closed: AtomicBool,
    write_lock: Mutex<()>,
    registry: Mutex<Vec<Arc<Mutex<Connection>>>>,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("path", &self.path)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl DurableStore {
    /// Open (or create) the database at `path` and ensure the schema
    /// exists. `path` may be `:memory:`-style special names understood by
    /// SQLite, in which case the store is private to this connection (and
    /// thus effectively single-threaded).
    #[instrument(skip(path))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            path,
            closed: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            registry: Mutex::new(Vec::new()),
        };
        {
            let conn = store.connection()?;
            let conn = conn.lock();
            conn.execute_batch(schema::SCHEMA_SQL)?;
            conn.execute(
                "INSERT OR REPLACE INTO run_metadata (key, value) VALUES ('schema_version', ?1)",
                rusqlite::params![schema::SCHEMA_VERSION.to_string()],
            )?;
        }
        Ok(store)
    }

    fn connection(&self) -> Result<Arc<Mutex<Connection>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        TLS_CONNECTIONS.with(|cell| {
            let mut map = cell.borrow_mut();
            if let Some(existing) = map.get(&self.id) {
                return Ok(existing.clone());
            }
            let conn = open_connection(&self.path)?;
            let handle = Arc::new(Mutex::new(conn));
            self.registry.lock().push(handle.clone());
            map.insert(self.id, handle.clone());
            Ok(handle)
        })
    }

    // ==================== Metadata ====================

    #[instrument(skip(self, value))]
    pub fn set_metadata(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.connection()?;
        let _write = self.write_lock.lock();
        let conn = conn.lock();
        let encoded = serde_json::to_string(value)?;
        conn.execute(
            "INSERT OR REPLACE INTO run_metadata (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, encoded],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.connection()?;
        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT value FROM run_metadata WHERE key = ?1")?;
        let mut rows = stmt.query(rusqlite::params![key])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    // ==================== Queue operations ====================

    /// Insert one record. Returns `true` if inserted, `false` on a
    /// fingerprint conflict (already present — not an error).
    #[instrument(skip(self, rec), fields(url = %rec.url))]
    pub fn enqueue(&self, rec: &UrlRecord) -> Result<bool> {
        let conn = self.connection()?;
        let _write = self.write_lock.lock();
        let conn = conn.lock();
        insert_record(&conn, rec)
    }

    /// Insert many records in one transaction. Returns the count actually
    /// inserted; conflicting records are silently skipped.
    #[instrument(skip(self, recs), fields(count = recs.len()))]
    pub fn enqueue_batch(&self, recs: &[UrlRecord]) -> Result<usize> {
        if recs.is_empty() {
            return Ok(0);
        }
        let conn = self.connection()?;
        let _write = self.write_lock.lock();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        let mut added = 0;
        for rec in recs {
            if insert_record(&tx, rec)? {
                added += 1;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Return up to `n` oldest pending rows, atomically marking them
    /// `in_progress` in the same transaction.
    #[instrument(skip(self))]
    pub fn dequeue(&self, n: usize) -> Result<Vec<StoredUrlRow>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let conn = self.connection()?;
        let _write = self.write_lock.lock();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        let rows: Vec<StoredUrlRow> = {
            let mut stmt = tx.prepare(
                "SELECT * FROM url_queue WHERE status = 'pending' ORDER BY id ASC LIMIT ?1",
            )?;
            let mapped = stmt.query_map(rusqlite::params![n as i64], rows::row_from_sqlite)?;
            mapped.collect::<std::result::Result<Vec<_>, _>>()?
        };
        if !rows.is_empty() {
            let now = crate::util::now_iso();
            let mut update = tx.prepare(
                "UPDATE url_queue SET status = 'in_progress', updated_at = ?1 WHERE id = ?2",
            )?;
            for row in &rows {
                update.execute(rusqlite::params![now, row.id])?;
            }
        }
        tx.commit()?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn mark_done(&self, id: i64) -> Result<()> {
        let conn = self.connection()?;
        let _write = self.write_lock.lock();
        let conn = conn.lock();
        conn.execute(
            "UPDATE url_queue SET status = 'done', updated_at = ?1 WHERE id = ?2",
            rusqlite::params![crate::util::now_iso(), id],
        )?;
        Ok(())
    }

    /// Revert every `in_progress` row to `pending`, and delete any
    /// placeholder `check_results` row whose fingerprint matches one of
    /// those rows, in one atomic step. Returns the number of rows reset.
    #[instrument(skip(self))]
    pub fn reset_in_progress(&self) -> Result<usize> {
        let conn = self.connection()?;
        let _write = self.write_lock.lock();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM check_results WHERE valid = -1 AND fingerprint IN (
                SELECT fingerprint FROM url_queue WHERE status = 'in_progress' AND fingerprint IS NOT NULL
            )",
            [],
        )?;
        let reset = tx.execute(
            "UPDATE url_queue SET status = 'pending', updated_at = ?1 WHERE status = 'in_progress'",
            rusqlite::params![crate::util::now_iso()],
        )?;
        tx.commit()?;
        Ok(reset)
    }

    pub fn has_pending(&self) -> Result<bool> {
        let conn = self.connection()?;
        let conn = conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM url_queue WHERE status IN ('pending', 'in_progress')",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn queue_stats(&self) -> Result<QueueStats> {
        let conn = self.connection()?;
        let conn = conn.lock();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM url_queue GROUP BY status")?;
        let mut rows = stmt.query([])?;
        let mut stats = QueueStats::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            match RecordStatus::from_str(&status) {
                RecordStatus::Pending => stats.pending = count,
                RecordStatus::InProgress => stats.in_progress = count,
                RecordStatus::Done => stats.done = count,
                RecordStatus::Skipped => stats.skipped = count,
            }
        }
        Ok(stats)
    }

    // ==================== Result cache (cold tier) ====================

    /// `value = None` inserts a placeholder if absent (no-op otherwise).
    /// `value = Some(result)` inserts-or-replaces the full decoded row.
    #[instrument(skip(self, value))]
    pub fn add_result(&self, fingerprint: &str, value: Option<&CheckResult>) -> Result<()> {
        let conn = self.connection()?;
        let _write = self.write_lock.lock();
        let conn = conn.lock();
        match value {
            None => {
                let placeholder = CheckResult::placeholder(String::new());
                match rows::insert_result(&conn, fingerprint, &placeholder, true) {
                    Ok(()) => Ok(()),
                    Err(StoreError::UniqueConflict) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            Some(result) => rows::insert_result(&conn, fingerprint, result, false),
        }
    }

    pub fn get_result(&self, fingerprint: &str) -> Result<Option<CheckResult>> {
        let conn = self.connection()?;
        let conn = conn.lock();
        rows::get_result(&conn, fingerprint)
    }

    pub fn has_result(&self, fingerprint: &str) -> Result<bool> {
        let conn = self.connection()?;
        let conn = conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM check_results WHERE fingerprint = ?1",
            rusqlite::params![fingerprint],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Count of real (non-placeholder) results.
    pub fn result_count(&self) -> Result<i64> {
        let conn = self.connection()?;
        let conn = conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM check_results WHERE valid != -1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All fingerprints currently known to the store (placeholders
    /// included). Used to hydrate the result cache's `known_keys` set on
    /// construction so `has()` does not trail a warm store after a cold
    /// restart (SPEC_FULL.md §4.2).
    pub fn all_fingerprints(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT fingerprint FROM check_results")?;
        let mapped = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(mapped.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // ==================== Lifecycle ====================

    /// Idempotent. Marks the store unusable; further operations fail fast
    /// with [`StoreError::Closed`].
    #[instrument(skip(self))]
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut registry = self.registry.lock();
        registry.clear();
        TLS_CONNECTIONS.with(|cell| {
            cell.borrow_mut().remove(&self.id);
        });
    }

    /// Close, then remove the primary database file plus its WAL/SHM
    /// sidecars.
    #[instrument(skip(self))]
    pub fn delete_db(&self) -> Result<()> {
        self.close();
        if self.path.as_os_str() == ":memory:" {
            return Ok(());
        }
        for suffix in ["", "-wal", "-shm"] {
            let mut candidate = self.path.clone().into_os_string();
            candidate.push(suffix);
            let candidate = PathBuf::from(candidate);
            if candidate.exists() {
                std::fs::remove_file(&candidate).map_err(StoreError::Io)?;
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = if path.as_os_str() == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(path)?
    };
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(conn)
}

fn insert_record(conn: &Connection, rec: &UrlRecord) -> Result<bool> {
    let extern_json = rec
        .extern_info
        .map(|pair| serde_json::to_string(&[pair.0, pair.1]))
        .transpose()?;
    let result = conn.execute(
        "INSERT INTO url_queue
            (url, fingerprint, parent_url, base_ref, recursion_level, line,
             column_num, page, name, extern, url_encoding, parent_content_type,
             status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'pending', ?13)",
        rusqlite::params![
            rec.url,
            rec.fingerprint,
            rec.parent_url,
            rec.base_ref,
            rec.recursion_level,
            rec.line,
            rec.column,
            rec.page,
            rec.name,
            extern_json,
            rec.url_encoding,
            rec.parent_content_type,
            crate::util::now_iso(),
        ],
    );
    match result {
        Ok(_) => Ok(true),
        Err(e) if rows::is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
