//! Interval-set algebra and the `Tracker` coordinator over a pluggable
//! `TrackerStore`. See `section` for the pure algebra and `tracker` for
//! the stateful, locked API spec.md describes in §4.1.

pub mod error;
pub mod section;
pub mod store;
pub mod tracker;

pub use error::{Result, TrackerError};
pub use section::{Section, Sections};
pub use store::TrackerStore;
pub use tracker::{Tracker, NO_RETURN_LIMIT};
