//! Postgres implementation of `TrackerStore`.
//!
//! A newtype wrapping `PgPool`, runtime-checked SQL only (`sqlx::query` /
//! `sqlx::query_as`, never the `query!` macros) so the crate builds
//! without a live database — mirrors `sem_os_postgres::store`.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;

use zindexer_tracker::{Result, Section, Sections, TrackerStore};

/// Rows are inserted in chunks of this size per `write`, matching the
/// original's `CreateInBatches(20_000)` call in `tracker.go`.
const WRITE_BATCH_SIZE: usize = 20_000;

pub struct PgTrackerStore {
    pool: PgPool,
}

impl PgTrackerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackerStore for PgTrackerStore {
    async fn read(&self, scope: &str) -> Result<Sections> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT start_idx, end_idx
            FROM tracking
            WHERE indexer_id = $1
            ORDER BY start_idx
            "#,
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(rows.into_iter().map(|(start, end)| Section::new(start as u64, end as u64)).collect())
    }

    async fn write(&self, scope: &str, sections: &Sections) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        sqlx::query("DELETE FROM tracking WHERE indexer_id = $1")
            .bind(scope)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;

        for batch in sections.chunks(WRITE_BATCH_SIZE) {
            if batch.is_empty() {
                continue;
            }

            let mut query = String::from("INSERT INTO tracking (indexer_id, start_idx, end_idx) VALUES ");
            for i in 0..batch.len() {
                if i > 0 {
                    query.push(',');
                }
                let base = i * 2;
                query.push_str(&format!(" ($1, ${}, ${})", base + 2, base + 3));
            }

            let mut q = sqlx::query(&query).bind(scope);
            for section in batch {
                q = q.bind(section.start as i64).bind(section.end as i64);
            }
            q.execute(&mut *tx).await.map_err(|e| anyhow!(e))?;
        }

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn delete_scope(&self, scope: &str) -> Result<()> {
        sqlx::query("DELETE FROM tracking WHERE indexer_id = $1")
            .bind(scope)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn tracked_tip(&self, scope: &str) -> Result<u64> {
        let tip: Option<i64> =
            sqlx::query_scalar("SELECT MAX(end_idx) FROM tracking WHERE indexer_id = $1")
                .bind(scope)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(tip.unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn write_then_read_round_trips_sections(pool: PgPool) {
        let store = PgTrackerStore::new(pool);
        let sections = vec![Section::new(1, 3), Section::new(10, 10)];

        store.write("chain", &sections).await.unwrap();
        assert_eq!(store.read("chain").await.unwrap(), sections);
        assert_eq!(store.tracked_tip("chain").await.unwrap(), 10);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn write_replaces_the_entire_scope(pool: PgPool) {
        let store = PgTrackerStore::new(pool);
        store.write("chain", &[Section::new(1, 5)].to_vec()).await.unwrap();
        store.write("chain", &[Section::new(100, 200)].to_vec()).await.unwrap();

        assert_eq!(store.read("chain").await.unwrap(), vec![Section::new(100, 200)]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_scope_clears_only_that_scope(pool: PgPool) {
        let store = PgTrackerStore::new(pool);
        store.write("chain", &[Section::new(1, 5)].to_vec()).await.unwrap();
        store.write("chain_wip", &[Section::new(6, 9)].to_vec()).await.unwrap();

        store.delete_scope("chain_wip").await.unwrap();

        assert_eq!(store.read("chain").await.unwrap(), vec![Section::new(1, 5)]);
        assert_eq!(store.read("chain_wip").await.unwrap(), Vec::new());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_scope_reads_back_empty(pool: PgPool) {
        let store = PgTrackerStore::new(pool);
        assert_eq!(store.read("nonexistent").await.unwrap(), Vec::new());
        assert_eq!(store.tracked_tip("nonexistent").await.unwrap(), 0);
    }
}
