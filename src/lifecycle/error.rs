use miette::Diagnostic;
use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;

/// Errors from [`super::LifecycleCoordinator`] start-up/teardown.
#[derive(Debug, Error, Diagnostic)]
pub enum LifecycleError {
    #[error("storage error: {0}")]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("result cache error: {0}")]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error("config snapshot (de)serialization error: {0}")]
    #[diagnostic(code(linkcheck_store::lifecycle::serde))]
    Serde(#[from] serde_json::Error),
}
