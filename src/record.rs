//! Domain types shared by the store, cache, queue, and lifecycle modules.
//!
//! These are the Rust-side shapes of the "URL record" and "completed
//! result" described in the crate's data model. Serialization glue for the
//! SQLite wire format lives in `store`; this module stays pure data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a queue entry. Serializes to/from the exact strings required
/// by the storage schema: `pending`, `in_progress`, `done`, `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    InProgress,
    Done,
    Skipped,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::InProgress => "in_progress",
            RecordStatus::Done => "done",
            RecordStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "in_progress" => RecordStatus::InProgress,
            "done" => RecordStatus::Done,
            "skipped" => RecordStatus::Skipped,
            _ => RecordStatus::Pending,
        }
    }
}

/// A unit of work flowing through the hybrid queue: a URL to be checked,
/// plus the source-location and recursion bookkeeping the crawler needs to
/// report errors and to decide whether to recurse further.
///
/// `fingerprint` is the cache key (see [`crate::cache`]). It must be
/// `Some` unless the record carries an `inline_result` (a "synthetic
/// record" injected directly into the stream without ever touching the
/// network).
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    pub url: String,
    pub fingerprint: Option<String>,
    pub parent_url: Option<String>,
    pub base_ref: Option<String>,
    pub recursion_level: u32,
    pub line: i64,
    pub column: i64,
    pub page: i64,
    pub name: String,
    pub extern_info: Option<(bool, bool)>,
    pub url_encoding: Option<String>,
    pub parent_content_type: Option<String>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// A precomputed result carried inline, for synthetic records. When
    /// present, the record is prepended to the queue and observed by a
    /// consumer without ever being persisted or rebuilt.
    pub inline_result: Option<CheckResult>,
    /// The store row id this record was rebuilt from, if it was reloaded
    /// from the disk overflow tier. `task_done` uses this to tell the
    /// store to mark the row complete.
    pub store_row_id: Option<i64>,
}

impl UrlRecord {
    /// Construct a fresh pending record with the given url and fingerprint.
    /// Timestamps and optional fields default to "now" / empty.
    pub fn new(url: impl Into<String>, fingerprint: Option<String>) -> Self {
        Self {
            url: url.into(),
            fingerprint,
            parent_url: None,
            base_ref: None,
            recursion_level: 0,
            line: 0,
            column: 0,
            page: 0,
            name: String::new(),
            extern_info: None,
            url_encoding: None,
            parent_content_type: None,
            status: RecordStatus::Pending,
            created_at: Utc::now(),
            updated_at: None,
            inline_result: None,
            store_row_id: None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.inline_result.is_some()
    }
}

/// Whether a [`CheckResult`] is a real, completed outcome or a placeholder
/// marking "scheduled/in-flight, do not re-enqueue". The wire format
/// encodes this as the `valid` sentinel `-1` for placeholders (see
/// `store`); in memory we keep it out-of-band so a real result's `valid`
/// field can never collide with the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    Valid(bool),
    Placeholder,
}

/// A completed (or placeholder) check outcome, keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub url: String,
    pub valid: Validity,
    pub extern_flag: bool,
    pub result: String,
    /// Ordered (tag, message) pairs. Must round-trip as pairs, not flat
    /// lists.
    pub warnings: Vec<(String, String)>,
    pub info: Vec<String>,
    pub name: String,
    pub title: String,
    pub parent_url: String,
    pub base_ref: String,
    pub base_url: String,
    pub domain: String,
    pub content_type: String,
    /// `-1` means unknown, matching the wire sentinel exactly.
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
    pub dltime: f64,
    pub checktime: f64,
    pub line: i64,
    pub column: i64,
    pub page: i64,
    pub level: i64,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.valid, Validity::Placeholder)
    }

    /// Build the placeholder shape used to mark a fingerprint as
    /// scheduled/in-flight.
    pub fn placeholder(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            valid: Validity::Placeholder,
            extern_flag: false,
            result: "pending".to_string(),
            warnings: Vec::new(),
            info: Vec::new(),
            name: String::new(),
            title: String::new(),
            parent_url: String::new(),
            base_ref: String::new(),
            base_url: String::new(),
            domain: String::new(),
            content_type: String::new(),
            size: -1,
            modified: None,
            dltime: -1.0,
            checktime: 0.0,
            line: 0,
            column: 0,
            page: 0,
            level: 0,
            checked_at: Utc::now(),
        }
    }
}

/// A run-config snapshot stashed in the metadata map so a resumed run can
/// detect configuration drift. Generalized beyond the three named keys to
/// a JSON map so callers may stash additional opaque fields (see
/// SPEC_FULL.md §3).
pub type ConfigSnapshot = std::collections::BTreeMap<String, serde_json::Value>;
