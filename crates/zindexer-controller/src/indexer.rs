use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};

use prometheus::Registry;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use zindexer_buffer::{Buffer, FlushOutcome, SyncCb};
use zindexer_queue::{Dispatcher, DispatcherHandle, Job, Worker, WorkerConstructor, WorkerPool};
use zindexer_tracker::{Tracker, TrackerStore};

use crate::config::Config;
use crate::error::{ControllerError, Result};
use crate::metrics::Metrics;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Supplies the heights a controller should enqueue next, typically an
/// external chain-tip lookup composed with [`Tracker::get_missing`].
pub type MissingHeightsFn = Arc<dyn Fn() -> BoxFuture<Result<Vec<u64>>> + Send + Sync>;

/// A cheap handle to stop a running [`Indexer`] and wait for shutdown to
/// finish, independent of the tracker store type — this is what the
/// `/stop` HTTP handler and any other external caller holds, instead of
/// the full generic `Indexer<S>`.
#[derive(Clone)]
pub struct ControlHandle {
    pub(crate) stop_tx: watch::Sender<bool>,
    pub(crate) stop_done_rx: watch::Receiver<bool>,
}

impl ControlHandle {
    /// Requests shutdown at the controller's next suspension point.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Resolves once the controller's shutdown sequence has completed.
    pub async fn wait_for_stop_done(&self) {
        let mut rx = self.stop_done_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// The lifecycle controller (spec.md §4.5): owns the tracker, the
/// dispatcher/worker pool and the buffer, and drives the main loop that
/// turns "queue went empty" and "buffer flushed" events into tracker
/// reconciliation.
pub struct Indexer<S: TrackerStore + 'static> {
    id: String,
    tracker: Arc<Tracker<S>>,
    buffer: Arc<Buffer>,
    dispatcher_handle: DispatcherHandle,
    dispatcher: StdMutex<Option<Dispatcher>>,
    empty_queue_rx: StdMutex<Option<mpsc::Receiver<()>>>,
    sync_complete_rx: StdMutex<Option<mpsc::Receiver<FlushOutcome>>>,
    worker_pool: StdMutex<Option<WorkerPool>>,
    worker_ctor: StdMutex<Option<WorkerConstructor>>,
    missing_heights_fn: StdMutex<Option<MissingHeightsFn>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: StdMutex<Option<watch::Receiver<bool>>>,
    stop_done_tx: watch::Sender<bool>,
    stop_done_rx: watch::Receiver<bool>,
    config: Config,
    metrics: Metrics,
    metrics_registry: Registry,
}

impl<S: TrackerStore + 'static> Indexer<S> {
    pub fn new(id: impl Into<String>, tracker: Arc<Tracker<S>>, config: Config) -> Self {
        let (dispatcher, dispatcher_handle, empty_queue_rx) = Dispatcher::new(config.dispatcher);
        let buffer = Buffer::new(config.buffer);
        let sync_complete_rx = buffer.take_sync_complete_rx();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (stop_done_tx, stop_done_rx) = watch::channel(false);
        let metrics_registry = Registry::new();
        let metrics = Metrics::new(&metrics_registry);

        Self {
            id: id.into(),
            tracker,
            buffer,
            dispatcher_handle,
            dispatcher: StdMutex::new(Some(dispatcher)),
            empty_queue_rx: StdMutex::new(Some(empty_queue_rx)),
            sync_complete_rx: StdMutex::new(sync_complete_rx),
            worker_pool: StdMutex::new(None),
            worker_ctor: StdMutex::new(None),
            missing_heights_fn: StdMutex::new(None),
            stop_tx,
            stop_rx: StdMutex::new(Some(stop_rx)),
            stop_done_tx,
            stop_done_rx,
            config,
            metrics,
            metrics_registry,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracker(&self) -> &Arc<Tracker<S>> {
        &self.tracker
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// The in-process gauges/histograms tracked for this indexer (spec.md
    /// §2 "Metrics/Status surface"). Exposition over HTTP is out of scope
    /// (spec.md §1 Non-goals); callers who want a `/metrics` endpoint can
    /// wire `metrics_registry()` into their own `prometheus` exporter.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_registry(&self) -> &Registry {
        &self.metrics_registry
    }

    /// Lets the `/stop` HTTP surface (or any external caller) request
    /// shutdown without needing the full generic `Indexer<S>`.
    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle { stop_tx: self.stop_tx.clone(), stop_done_rx: self.stop_done_rx.clone() }
    }

    pub fn set_worker_constructor(&self, ctor: WorkerConstructor) {
        *self.worker_ctor.lock().unwrap() = Some(ctor);
    }

    /// Builds `count` workers against the worker constructor set via
    /// [`Self::set_worker_constructor`]. Must be called before
    /// [`Self::start`].
    pub fn build_workers(&self, count: usize) -> Result<()> {
        let ctor = self.worker_ctor.lock().unwrap().clone().ok_or(ControllerError::NoWorkerConstructor)?;
        let pool = WorkerPool::build(count, ctor, self.dispatcher_handle.worker_rendezvous.clone(), self.dispatcher_handle.subscribe_stop());
        *self.worker_pool.lock().unwrap() = Some(pool);
        Ok(())
    }

    pub async fn set_sync_cb(&self, cb: SyncCb) {
        self.buffer.set_sync_fn(cb).await;
    }

    pub fn set_missing_heights_fn(&self, f: MissingHeightsFn) {
        *self.missing_heights_fn.lock().unwrap() = Some(f);
    }

    /// Runs the startup sequence then the main event loop, blocking until
    /// shutdown. Intended to be driven from a single task per indexer
    /// instance (e.g. `tokio::spawn(indexer.start())` or awaited directly
    /// from `main`).
    pub async fn start(&self) -> Result<()> {
        info!(id = self.id.as_str(), "clearing wip scope");
        self.tracker.clear_wip(&self.id).await?;

        if self.config.enable_buffer {
            tokio::spawn(self.buffer.clone().run());
        }

        let dispatcher = self.dispatcher.lock().unwrap().take().expect("start() called more than once");
        tokio::spawn(dispatcher.run());

        let mut empty_queue_rx = self.empty_queue_rx.lock().unwrap().take().expect("start() called more than once");
        let mut sync_complete_rx = self.sync_complete_rx.lock().unwrap().take().expect("start() called more than once");
        let mut stop_rx = self.stop_rx.lock().unwrap().take().expect("start() called more than once");

        info!(id = self.id.as_str(), "indexer started");
        loop {
            tokio::select! {
                _ = empty_queue_rx.recv() => {
                    self.on_job_queue_empty().await;
                }
                Some(outcome) = sync_complete_rx.recv() => {
                    self.on_buffer_sync_complete(outcome).await;
                }
                _ = wait_for_termination_signal() => {
                    info!(id = self.id.as_str(), "exiting on OS signal");
                    break;
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!(id = self.id.as_str(), "exiting on stop request");
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        let _ = self.stop_done_tx.send(true);
        Ok(())
    }

    async fn on_job_queue_empty(&self) {
        let provider = self.missing_heights_fn.lock().unwrap().clone();
        let Some(provider) = provider else {
            warn!(id = self.id.as_str(), "job queue empty but no missing-heights provider is set");
            return;
        };

        match provider().await {
            Ok(heights) if heights.is_empty() => {
                self.metrics.set_total_missing_heights(&self.id, 0);
                debug!(id = self.id.as_str(), "missing-heights provider returned nothing, retrying later");
            }
            Ok(heights) => {
                self.metrics.set_total_missing_heights(&self.id, heights.len());
                info!(id = self.id.as_str(), count = heights.len(), "enqueueing newly discovered heights");
                if let Err(e) = self.tracker.mark_in_progress(&heights, &self.id, true).await {
                    error!(id = self.id.as_str(), error = %e, "failed to mark heights in-progress");
                    return;
                }
                self.dispatcher_handle.enqueue_batch(heights.into_iter().map(Job::height)).await;
                let depth = self.dispatcher_handle.job_pool.len().await;
                self.metrics.set_dispatcher_queue_depth(&self.id, depth);
            }
            Err(e) => {
                error!(id = self.id.as_str(), error = %e, "missing-heights provider failed");
            }
        }
    }

    async fn on_buffer_sync_complete(&self, outcome: FlushOutcome) {
        self.metrics.observe_buffer_sync_duration(&self.id, outcome.duration.as_secs_f64());
        let result = outcome.result;

        let Some(heights) = result.synced_heights else {
            warn!(id = self.id.as_str(), "flush reported no attempted heights, nothing to reconcile this cycle");
            return;
        };
        if heights.is_empty() {
            return;
        }

        if let Some(err) = &result.error {
            warn!(id = self.id.as_str(), error = err.as_str(), count = heights.len(), "flush failed, releasing wip for attempted heights");
            if let Err(e) = self.tracker.mark_in_progress(&heights, &self.id, false).await {
                error!(id = self.id.as_str(), error = %e, "failed to release wip after a failed flush");
            }
            return;
        }

        if let Err(e) = self.tracker.commit_and_release_wip(&heights, &self.id).await {
            error!(id = self.id.as_str(), error = %e, "failed to commit heights after a successful flush");
        }
    }

    async fn shutdown(&self) {
        info!(id = self.id.as_str(), "shutting down");
        self.dispatcher_handle.stop();
        let pool = self.worker_pool.lock().unwrap().take();
        if let Some(pool) = pool {
            pool.join().await;
        }
        self.buffer.stop().await;
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
        _ = sighup.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// A [`Worker`] built from a plain async closure, so callers (and tests)
/// can supply per-job logic without writing a dedicated struct.
pub struct FnWorker<F> {
    f: F,
}

impl<F, Fut> FnWorker<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn do_work(&self, job: Job) {
        (self.f)(job).await;
    }
}
