use miette::Diagnostic;
use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;

/// Errors from [`super::HybridQueue`] operations.
#[derive(Debug, Error, Diagnostic)]
pub enum QueueError {
    #[error("timed out waiting for the queue")]
    #[diagnostic(
        code(linkcheck_store::queue::timeout),
        help("join(timeout) did not observe unfinished reach zero before the deadline.")
    )]
    Timeout,

    #[error("queue is empty")]
    #[diagnostic(
        code(linkcheck_store::queue::empty),
        help("get(timeout) found nothing before the deadline; this is a normal empty-queue \
              signal, not a failure. get(None) blocks forever instead of returning this.")
    )]
    Empty,

    #[error("queue invariant violated: {0}")]
    #[diagnostic(
        code(linkcheck_store::queue::invariant_violation),
        help("Indicates a caller bug (task_done called too many times, or shutdown bookkeeping \
              drift), not a transient failure.")
    )]
    InvariantViolation(String),

    #[error("result cache error: {0}")]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error("storage error: {0}")]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// A stored row could not be reconstructed into a full [`crate::record::UrlRecord`]
/// by the caller-supplied rebuilder. Logged and the row is dropped for this
/// load cycle; never surfaced as a [`QueueError`].
#[derive(Debug, Error)]
#[error("rebuild failed: {0}")]
pub struct RebuildError(pub String);
