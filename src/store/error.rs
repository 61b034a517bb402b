use miette::Diagnostic;
use thiserror::Error;

/// Errors from [`super::DurableStore`] operations.
///
/// Unique-key conflicts are deliberately not represented here: callers
/// that can hit one (`enqueue`, `enqueue_batch`, placeholder
/// `add_result`) get a `bool`/count back instead, per `spec.md` §4.1/§7.
/// [`StoreError::UniqueConflict`] exists only as an internal signal
/// between `rows` helpers and `mod.rs` and should never escape a public
/// method.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    #[diagnostic(
        code(linkcheck_store::store::sqlite),
        help("Check that the database file is accessible and not corrupted.")
    )]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(linkcheck_store::store::io),
        help("Check filesystem permissions for the database path.")
    )]
    Io(#[source] std::io::Error),

    #[error("JSON (de)serialization error: {0}")]
    #[diagnostic(code(linkcheck_store::store::serde))]
    Serde(#[from] serde_json::Error),

    #[error("store is closed")]
    #[diagnostic(
        code(linkcheck_store::store::closed),
        help("Do not use a DurableStore after calling close() or delete_db().")
    )]
    Closed,

    #[error("unique key conflict")]
    #[diagnostic(code(linkcheck_store::store::unique_conflict))]
    UniqueConflict,

    #[error("malformed row: {0}")]
    #[diagnostic(
        code(linkcheck_store::store::malformed_row),
        help("A row's encoded fields (extern/warnings/info) did not decode cleanly.")
    )]
    MalformedRow(String),
}
