use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("tracker error: {0}")]
    Tracker(#[from] zindexer_tracker::TrackerError),

    #[error("missing-heights provider failed: {0}")]
    MissingHeightsProvider(String),

    #[error("no worker constructor set; call set_worker_constructor before build_workers")]
    NoWorkerConstructor,

    #[error("status server failed: {0}")]
    StatusServer(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
