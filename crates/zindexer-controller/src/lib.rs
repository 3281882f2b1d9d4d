//! Lifecycle controller (spec.md §4.5): wires the tracker, the
//! dispatcher/worker pool and the write-back buffer into a single
//! `Indexer`, with `Config` loading and a small `axum` status surface.

pub mod config;
pub mod error;
pub mod indexer;
pub mod metrics;
pub mod status_server;

pub use config::Config;
pub use error::{ControllerError, Result};
pub use indexer::{ControlHandle, FnWorker, Indexer, MissingHeightsFn};
pub use metrics::Metrics;
