//! Write-back staging buffer (spec.md §4.4): stages records per
//! `(data_class, height)` and flushes on a size threshold or a timer.

pub mod buffer;
pub mod error;

pub use buffer::{Buffer, BufferConfig, FlushOutcome, SyncCb, SyncResult, DEFAULT_SYNC_TIME_PERIOD};
pub use error::BufferError;
