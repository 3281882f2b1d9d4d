//! sqlx-backed `TrackerStore` adapter, the only crate in the workspace
//! that knows about Postgres — mirrors `sem_os_postgres` sitting behind
//! `sem_os_core`'s port traits.

pub mod pool;
pub mod store;

pub use pool::{connect, ensure_schema};
pub use store::PgTrackerStore;
