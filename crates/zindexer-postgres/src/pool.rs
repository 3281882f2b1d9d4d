use sqlx::postgres::{PgPool, PgPoolOptions};

/// Builds a connection pool the way `agentic_server.rs` does —
/// `PgPoolOptions::new().max_connections(n).connect(url)` — rather than
/// the original's GORM-based `NewPostgresConnection`, since this
/// workspace standardizes on sqlx throughout.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(max_connections).connect(database_url).await
}

/// Applies the `tracking` table DDL. Idempotent (`CREATE TABLE IF NOT
/// EXISTS`) — safe to call on every startup, the way the teacher's
/// `run_migrations` checks-and-applies schema rather than tracking a
/// migration version table. sqlx's prepared-statement protocol can't run
/// more than one command per `query()` call, so the table and its index
/// are applied as two statements rather than the whole migration file at
/// once.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracking (
            indexer_id text NOT NULL,
            start_idx  bigint NOT NULL,
            end_idx    bigint NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS tracking_indexer_id_idx ON tracking (indexer_id)")
        .execute(pool)
        .await?;

    Ok(())
}
