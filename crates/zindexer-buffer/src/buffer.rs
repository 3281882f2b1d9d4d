use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::debug;

use crate::error::BufferError;

/// Default sync period (spec.md §6: `syncTimePeriod = 30s`).
pub const DEFAULT_SYNC_TIME_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    pub sync_time_period: Duration,
    /// `None` disables the size trigger entirely; inserts only ever
    /// flush on the timer.
    pub sync_block_threshold: Option<usize>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { sync_time_period: DEFAULT_SYNC_TIME_PERIOD, sync_block_threshold: None }
    }
}

/// Result of a flush, produced by the user-supplied [`SyncCb`].
///
/// `synced_heights` is the set of heights this flush *considered* —
/// implementers should populate it from [`Buffer::get_data`] whether or
/// not the write actually lands, since a controller reconciling wip needs
/// to know which heights to release even on failure. `None` means the
/// flush never got as far as knowing what it touched (e.g. no sync
/// function configured); those heights simply stay wip until the next
/// successful cycle. `error` carries a failure without implying the
/// heights are unknown.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub synced_heights: Option<Vec<u64>>,
    pub error: Option<String>,
}

/// A completed flush cycle: the callback's [`SyncResult`] plus how long
/// the callback took to run. Kept separate from `SyncResult` itself so the
/// flush callback signature stays exactly what spec.md §6 defines — timing
/// is plumbing `Buffer::flush` adds around the callback, not something
/// implementers report themselves.
#[derive(Debug, Clone)]
pub struct FlushOutcome {
    pub result: SyncResult,
    pub duration: Duration,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The flush callback. Implementers read buffered records back out with
/// [`Buffer::get_data`], persist them, and report which heights they
/// claim to have durably written.
pub type SyncCb = Arc<dyn Fn() -> BoxFuture<SyncResult> + Send + Sync>;

/// In-memory staging area keyed by `(data_class, height)`, flushed on
/// either a size threshold or a timer (spec.md §4.4). A single mutex
/// (`flush_mutex`) serializes inserts against flushes: a flush holds it
/// for the entire snapshot-sync-clear cycle, so concurrent inserts queue
/// up behind it rather than racing the clear.
pub struct Buffer {
    data: DashMap<String, DashMap<u64, serde_json::Value>>,
    flush_mutex: Mutex<()>,
    sync_cb: RwLock<Option<SyncCb>>,
    config: BufferConfig,
    new_data_tx: mpsc::Sender<String>,
    new_data_rx: StdMutex<Option<mpsc::Receiver<String>>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: StdMutex<Option<watch::Receiver<bool>>>,
    sync_complete_tx: mpsc::Sender<FlushOutcome>,
    sync_complete_rx: StdMutex<Option<mpsc::Receiver<FlushOutcome>>>,
}

impl Buffer {
    pub fn new(config: BufferConfig) -> Arc<Self> {
        let (new_data_tx, new_data_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (sync_complete_tx, sync_complete_rx) = mpsc::channel(1);

        Arc::new(Self {
            data: DashMap::new(),
            flush_mutex: Mutex::new(()),
            sync_cb: RwLock::new(None),
            config,
            new_data_tx,
            new_data_rx: StdMutex::new(Some(new_data_rx)),
            stop_tx,
            stop_rx: StdMutex::new(Some(stop_rx)),
            sync_complete_tx,
            sync_complete_rx: StdMutex::new(Some(sync_complete_rx)),
        })
    }

    pub async fn set_sync_fn(&self, cb: SyncCb) {
        *self.sync_cb.write().await = Some(cb);
    }

    /// Takes ownership of the sync-complete channel. Call once, before
    /// `run()`; the receiver end is how a lifecycle controller learns a
    /// flush happened and reconciles with the tracker.
    pub fn take_sync_complete_rx(&self) -> Option<mpsc::Receiver<FlushOutcome>> {
        self.sync_complete_rx.lock().unwrap().take()
    }

    /// Inserts `value` under `(data_class, height)`. If `notify` is set,
    /// the size-threshold condition is checked for `data_class` as soon
    /// as the insert is visible.
    pub async fn insert(&self, data_class: &str, height: u64, value: serde_json::Value, notify: bool) {
        let _guard = self.flush_mutex.lock().await;
        self.data.entry(data_class.to_string()).or_default().insert(height, value);

        if notify {
            // Non-blocking: a slow/absent consumer must never stall an insert.
            let _ = self.new_data_tx.try_send(data_class.to_string());
        }
    }

    pub fn buffer_size(&self, data_class: &str) -> usize {
        self.data.get(data_class).map(|m| m.len()).unwrap_or(0)
    }

    /// A snapshot of everything currently buffered for `data_class`.
    pub fn get_data(&self, data_class: &str) -> HashMap<u64, serde_json::Value> {
        self.data
            .get(data_class)
            .map(|m| m.iter().map(|e| (*e.key(), e.value().clone())).collect())
            .unwrap_or_default()
    }

    fn clear_all(&self) {
        for entry in self.data.iter() {
            entry.value().clear();
        }
    }

    /// Runs one flush cycle: calls the sync callback, clears every
    /// buffer unconditionally (successful or not — §7: failed data is
    /// discarded, not retried, because workers are expected to be
    /// deterministic enough to reproduce it), then delivers the result.
    async fn flush(&self) {
        let _guard = self.flush_mutex.lock().await;

        let cb = self.sync_cb.read().await.clone();
        let started = Instant::now();
        let result = match cb {
            Some(cb) => cb().await,
            None => SyncResult { synced_heights: None, error: Some(BufferError::NoSyncFunction.to_string()) },
        };
        let duration = started.elapsed();

        self.clear_all();

        // Drop-on-no-receiver, matching the dispatcher's empty-queue
        // channel: the controller need not observe every flush.
        let _ = self.sync_complete_tx.try_send(FlushOutcome { result, duration });
    }

    /// Drives the timer/size-trigger loop. Spawn this once
    /// (`tokio::spawn(buffer.clone().run())`) after `take_sync_complete_rx`.
    pub async fn run(self: Arc<Self>) {
        let mut new_data_rx = self.new_data_rx.lock().unwrap().take().expect("run() already called");
        let mut stop_rx = self.stop_rx.lock().unwrap().take().expect("run() already called");
        let mut ticker = tokio::time::interval(self.config.sync_time_period);
        ticker.tick().await; // first tick fires immediately; discard it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("buffer syncing because of ticker");
                    self.flush().await;
                    ticker.reset();
                }
                Some(class) = new_data_rx.recv() => {
                    if let Some(threshold) = self.config.sync_block_threshold {
                        let size = self.buffer_size(&class);
                        if size >= threshold {
                            debug!(class = class.as_str(), size, "buffer syncing because of size threshold");
                            self.flush().await;
                            ticker.reset();
                        }
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        debug!("buffer exiting");
                        return;
                    }
                }
            }
        }
    }

    /// Signals the run loop to stop, then waits for any in-flight flush
    /// to finish before returning.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let _guard = self.flush_mutex.lock().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_sync_cb(buffer: Arc<Buffer>, calls: Arc<AtomicUsize>) -> SyncCb {
        Arc::new(move || {
            let buffer = buffer.clone();
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let data = buffer.get_data("transaction");
                let mut heights: Vec<u64> = data.keys().copied().collect();
                heights.sort_unstable();
                SyncResult { synced_heights: Some(heights), error: None }
            })
        })
    }

    #[tokio::test]
    async fn size_threshold_triggers_a_flush_with_every_inserted_height() {
        let buffer = Buffer::new(BufferConfig {
            sync_time_period: Duration::from_secs(5),
            sync_block_threshold: Some(5),
        });
        let mut sync_complete = buffer.take_sync_complete_rx().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        buffer.set_sync_fn(counting_sync_cb(buffer.clone(), calls.clone())).await;

        let run_handle = tokio::spawn(buffer.clone().run());

        for h in 0..5u64 {
            buffer.insert("transaction", h, serde_json::json!({"height": h}), true).await;
        }

        let outcome = tokio::time::timeout(Duration::from_secs(1), sync_complete.recv())
            .await
            .expect("sync should fire on size threshold")
            .unwrap();

        assert_eq!(outcome.result.synced_heights, Some(vec![0, 1, 2, 3, 4]));
        assert_eq!(buffer.buffer_size("transaction"), 0);

        buffer.stop().await;
        let _ = tokio::time::timeout(Duration::from_secs(1), run_handle).await;
    }

    #[tokio::test]
    async fn timer_triggers_a_flush_with_whatever_is_pending() {
        let buffer = Buffer::new(BufferConfig {
            sync_time_period: Duration::from_millis(50),
            sync_block_threshold: Some(5),
        });
        let mut sync_complete = buffer.take_sync_complete_rx().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        buffer.set_sync_fn(counting_sync_cb(buffer.clone(), calls.clone())).await;

        let run_handle = tokio::spawn(buffer.clone().run());

        for h in 0..4u64 {
            buffer.insert("transaction", h, serde_json::json!({"height": h}), true).await;
        }

        let outcome = tokio::time::timeout(Duration::from_secs(1), sync_complete.recv())
            .await
            .expect("sync should fire on timer")
            .unwrap();

        assert_eq!(outcome.result.synced_heights, Some(vec![0, 1, 2, 3]));

        buffer.stop().await;
        let _ = tokio::time::timeout(Duration::from_secs(1), run_handle).await;
    }

    #[tokio::test]
    async fn flush_without_a_sync_fn_reports_no_sync_function_error() {
        let buffer = Buffer::new(BufferConfig {
            sync_time_period: Duration::from_millis(20),
            sync_block_threshold: None,
        });
        let mut sync_complete = buffer.take_sync_complete_rx().unwrap();
        let run_handle = tokio::spawn(buffer.clone().run());

        let outcome = tokio::time::timeout(Duration::from_secs(1), sync_complete.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.result.error.is_some());
        assert!(outcome.result.synced_heights.is_none());

        buffer.stop().await;
        let _ = tokio::time::timeout(Duration::from_secs(1), run_handle).await;
    }
}
