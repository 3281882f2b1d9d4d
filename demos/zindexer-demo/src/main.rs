//! Demo wiring: a toy fixed-tip "chain" provider feeds the dispatcher,
//! workers fake-fetch a block per height into the write-back buffer, and
//! the sync callback persists them to a `demo_blocks` table — the same
//! shape `agentic_server.rs` uses to stand up a Postgres-backed service
//! (`tracing_subscriber::fmt::init()`, `PgPoolOptions`, an axum status
//! surface), just pointed at zindexer's coordinator instead of the DSL API.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::info;

use zindexer_buffer::SyncResult;
use zindexer_controller::{Config, ControllerError, FnWorker, Indexer};
use zindexer_queue::{Job, Worker};
use zindexer_tracker::Tracker;

const DEMO_TIP: u64 = 1000;
const DEMO_GENESIS: u64 = 0;

async fn ensure_demo_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS demo_blocks (
            height bigint PRIMARY KEY,
            payload jsonb NOT NULL,
            synced_at timestamptz NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/zindexer".to_string());
    info!(database_url = database_url.as_str(), "connecting to database");

    let pool = zindexer_postgres::connect(&database_url, 10).await?;
    zindexer_postgres::ensure_schema(&pool).await?;
    ensure_demo_schema(&pool).await?;

    let tracker = Arc::new(Tracker::new(Arc::new(zindexer_postgres::PgTrackerStore::new(pool.clone()))));
    let config = Config::from_env();
    let status_addr = config.status_addr;

    let indexer = Arc::new(Indexer::new("demo-chain", tracker.clone(), config));

    let missing_tracker = tracker.clone();
    indexer.set_missing_heights_fn(Arc::new(move || {
        let tracker = missing_tracker.clone();
        Box::pin(async move {
            tracker
                .get_missing(DEMO_TIP, DEMO_GENESIS, 50, "demo-chain")
                .await
                .map_err(ControllerError::from)
        })
    }));

    let buffer_for_worker = indexer.buffer().clone();
    indexer.set_worker_constructor(Arc::new(move |id: String| {
        let buffer = buffer_for_worker.clone();
        Arc::new(FnWorker::new(move |job: Job| {
            let buffer = buffer.clone();
            let worker_id = id.clone();
            async move {
                let height = job.id as u64;
                // Stand-in for an actual chain RPC call.
                tokio::time::sleep(Duration::from_millis(5)).await;
                info!(worker = worker_id.as_str(), height, "fetched block");
                buffer
                    .insert("block", height, serde_json::json!({ "height": height, "hash": format!("0xblock{height}") }), true)
                    .await;
            }
        })) as Arc<dyn Worker>
    }));
    indexer.build_workers(8)?;

    let sync_pool = pool.clone();
    let sync_buffer = indexer.buffer().clone();
    indexer
        .set_sync_cb(Arc::new(move || {
            let pool = sync_pool.clone();
            let buffer = sync_buffer.clone();
            Box::pin(async move {
                let data = buffer.get_data("block");
                let mut heights: Vec<u64> = data.keys().copied().collect();
                heights.sort_unstable();

                for height in &heights {
                    let payload = &data[height];
                    if let Err(e) = sqlx::query(
                        r#"
                        INSERT INTO demo_blocks (height, payload)
                        VALUES ($1, $2)
                        ON CONFLICT (height) DO UPDATE SET payload = $2, synced_at = now()
                        "#,
                    )
                    .bind(*height as i64)
                    .bind(payload)
                    .execute(&pool)
                    .await
                    {
                        return SyncResult { synced_heights: Some(heights), error: Some(e.to_string()) };
                    }
                }

                SyncResult { synced_heights: Some(heights), error: None }
            })
        }))
        .await;

    let status_control = indexer.control_handle();
    tokio::spawn(async move {
        if let Err(e) = zindexer_controller::status_server::serve(status_addr, status_control).await {
            tracing::error!(error = %e, "status server exited");
        }
    });

    indexer.start().await?;
    Ok(())
}
