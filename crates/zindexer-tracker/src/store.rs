use async_trait::async_trait;

use crate::error::Result;
use crate::section::Sections;

/// Storage port the `Tracker` depends on — implemented by
/// `zindexer-postgres`. Core tracker logic never touches a concrete
/// database client, the way `sem_os_core::ports` traits are only ever
/// implemented by `sem_os_postgres`.
///
/// Each method operates on a scope name (`id` or `<id>_wip`) and the
/// entire row set for that scope — callers never address individual rows.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Reads every section persisted for `scope`. An unknown scope reads
    /// back as an empty set, not an error.
    async fn read(&self, scope: &str) -> Result<Sections>;

    /// Atomically replaces every section persisted for `scope` with
    /// `sections` (`DELETE` then batched `INSERT`, one transaction).
    async fn write(&self, scope: &str, sections: &Sections) -> Result<()>;

    /// Deletes every row for `scope`. Used by `ClearWip` at startup.
    async fn delete_scope(&self, scope: &str) -> Result<()>;

    /// The highest `end_idx` committed for `scope`, or `0` if the scope
    /// is empty.
    async fn tracked_tip(&self, scope: &str) -> Result<u64>;
}
