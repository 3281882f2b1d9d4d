use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("no sync function set; call set_sync_fn first")]
    NoSyncFunction,

    #[error("sync failed: {0}")]
    SyncFailed(String),
}
