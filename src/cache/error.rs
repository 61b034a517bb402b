use miette::Diagnostic;
use thiserror::Error;

use crate::store::StoreError;

/// Errors from [`super::ResultCache`] operations. Thin wrapper over
/// [`StoreError`]: the cache has no failure mode of its own beyond the
/// cold tier's.
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("result cache storage error: {0}")]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}
