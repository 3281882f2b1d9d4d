//! FIFO job pool, dispatcher and worker-rendezvous pool (spec.md §4.2,
//! §4.3). Pure tokio/channels — no I/O dependency of its own.

pub mod dispatcher;
pub mod job;
pub mod worker;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle, DEFAULT_RETRY_TIMEOUT};
pub use job::{Job, JobPool};
pub use worker::{Worker, WorkerConstructor, WorkerPool};
