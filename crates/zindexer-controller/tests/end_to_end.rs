//! Scenario 7 (spec.md §8): 20 workers racing against a single tracker,
//! genesis 0, tip 1000, run until more than 200 heights are durably
//! tracked, then assert every height was ever processed exactly once —
//! the wip/mark-in-progress handoff is what's supposed to prevent the
//! same height from being dispatched to two workers at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use zindexer_buffer::{BufferConfig, SyncResult};
use zindexer_queue::{DispatcherConfig, Job, Worker};
use zindexer_tracker::{Sections, Tracker, TrackerStore};

use zindexer_controller::{Config, ControllerError, FnWorker, Indexer};

#[derive(Default)]
struct MemStore {
    scopes: StdMutex<HashMap<String, Sections>>,
}

#[async_trait]
impl TrackerStore for MemStore {
    async fn read(&self, scope: &str) -> zindexer_tracker::Result<Sections> {
        Ok(self.scopes.lock().unwrap().get(scope).cloned().unwrap_or_default())
    }

    async fn write(&self, scope: &str, sections: &Sections) -> zindexer_tracker::Result<()> {
        self.scopes.lock().unwrap().insert(scope.to_string(), sections.clone());
        Ok(())
    }

    async fn delete_scope(&self, scope: &str) -> zindexer_tracker::Result<()> {
        self.scopes.lock().unwrap().remove(scope);
        Ok(())
    }

    async fn tracked_tip(&self, scope: &str) -> zindexer_tracker::Result<u64> {
        Ok(self.scopes.lock().unwrap().get(scope).and_then(|s| s.iter().map(|sec| sec.end).max()).unwrap_or(0))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn twenty_workers_never_process_the_same_height_twice() {
    const GENESIS: u64 = 0;
    const TIP: u64 = 1000;

    let tracker = Arc::new(Tracker::new(Arc::new(MemStore::default())));

    let config = Config {
        enable_buffer: true,
        buffer: BufferConfig { sync_time_period: Duration::from_millis(25), sync_block_threshold: Some(30) },
        dispatcher: DispatcherConfig { retry_timeout: Duration::from_millis(10) },
        worker_count: 20,
        ..Config::default()
    };

    let indexer = Arc::new(Indexer::new("chain", tracker.clone(), config));

    let missing_tracker = tracker.clone();
    indexer.set_missing_heights_fn(Arc::new(move || {
        let tracker = missing_tracker.clone();
        Box::pin(async move {
            tracker
                .get_missing(TIP, GENESIS, 50, "chain")
                .await
                .map_err(ControllerError::from)
        })
    }));

    let processed: Arc<DashMap<u64, AtomicUsize>> = Arc::new(DashMap::new());
    let buffer_for_worker = indexer.buffer().clone();
    let processed_for_worker = processed.clone();
    indexer.set_worker_constructor(Arc::new(move |_id: String| {
        let buffer = buffer_for_worker.clone();
        let processed = processed_for_worker.clone();
        Arc::new(FnWorker::new(move |job: Job| {
            let buffer = buffer.clone();
            let processed = processed.clone();
            async move {
                let height = job.id as u64;
                processed.entry(height).or_insert_with(|| AtomicUsize::new(0)).fetch_add(1, Ordering::SeqCst);
                buffer.insert("chain_data", height, serde_json::json!({ "height": height }), true).await;
            }
        })) as Arc<dyn Worker>
    }));
    indexer.build_workers(20).unwrap();

    let sync_buffer = indexer.buffer().clone();
    indexer
        .set_sync_cb(Arc::new(move || {
            let buffer = sync_buffer.clone();
            Box::pin(async move {
                let data = buffer.get_data("chain_data");
                let mut heights: Vec<u64> = data.keys().copied().collect();
                heights.sort_unstable();
                SyncResult { synced_heights: Some(heights), error: None }
            })
        }))
        .await;

    let run_indexer = indexer.clone();
    let run_handle = tokio::spawn(async move { run_indexer.start().await });

    let wait_tracker = tracker.clone();
    tokio::time::timeout(Duration::from_secs(10), async move {
        loop {
            let tracked = wait_tracker.get_tracked("chain").await.unwrap();
            if tracked.len() > 200 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("expected more than 200 heights to be tracked within the timeout");

    indexer.control_handle().stop();
    tokio::time::timeout(Duration::from_secs(5), run_handle)
        .await
        .expect("indexer should shut down promptly")
        .unwrap()
        .unwrap();

    for entry in processed.iter() {
        assert_eq!(
            entry.value().load(Ordering::SeqCst),
            1,
            "height {} was processed {} times",
            entry.key(),
            entry.value().load(Ordering::SeqCst)
        );
    }
}
