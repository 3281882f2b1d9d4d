use thiserror::Error;

/// Errors surfaced by the tracker's mutation/query API.
///
/// Storage adapters (e.g. `zindexer-postgres`) map their own error types
/// into `Store` here via `#[from]` at the adapter boundary.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("invalid indexer id: {0}")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
