use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::job::{Job, JobPool};

/// Default retry timeout between empty-queue polls (spec.md §4.2).
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub retry_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { retry_timeout: DEFAULT_RETRY_TIMEOUT }
    }
}

/// Shared handles callers use to feed the dispatcher, wire up workers and
/// observe empty-queue events. Cheap to clone; cloning shares the
/// underlying channels and pool.
#[derive(Clone)]
pub struct DispatcherHandle {
    pub job_pool: Arc<JobPool>,
    pub worker_rendezvous: mpsc::Sender<oneshot::Sender<Job>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl DispatcherHandle {
    pub async fn enqueue(&self, job: Job) {
        self.job_pool.enqueue(job).await;
    }

    pub async fn enqueue_batch(&self, jobs: impl IntoIterator<Item = Job>) {
        self.job_pool.enqueue_batch(jobs).await;
    }

    /// Requests the dispatcher loop to stop at its next suspension point.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// A receiver on the same stop signal the dispatcher loop watches, so
    /// a worker pool built against this handle winds down in lockstep with
    /// it rather than needing a second stop channel threaded through.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }
}

/// Runs the dispatcher loop. Construct with [`Dispatcher::new`], then
/// `tokio::spawn(dispatcher.run())`.
pub struct Dispatcher {
    job_pool: Arc<JobPool>,
    retry_timeout: Duration,
    rendezvous_rx: mpsc::Receiver<oneshot::Sender<Job>>,
    empty_queue_tx: mpsc::Sender<()>,
    stop_rx: watch::Receiver<bool>,
}

impl Dispatcher {
    /// Builds a dispatcher plus the handle callers use to enqueue work,
    /// spawn workers against the same rendezvous channel, and stop it.
    /// Returns the dispatcher itself and a receiver for empty-queue
    /// events — that channel is bounded(1) with `try_send`, matching
    /// spec.md's "unbuffered; drop if no one is listening" semantics.
    pub fn new(cfg: DispatcherConfig) -> (Self, DispatcherHandle, mpsc::Receiver<()>) {
        let (rendezvous_tx, rendezvous_rx) = mpsc::channel(1);
        let (empty_queue_tx, empty_queue_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);

        let dispatcher = Dispatcher {
            job_pool: Arc::new(JobPool::new()),
            retry_timeout: cfg.retry_timeout,
            rendezvous_rx,
            empty_queue_tx,
            stop_rx,
        };
        let handle = DispatcherHandle {
            job_pool: dispatcher.job_pool.clone(),
            worker_rendezvous: rendezvous_tx,
            stop_tx,
            stop_rx: dispatcher.stop_rx.clone(),
        };

        (dispatcher, handle, empty_queue_rx)
    }

    /// The dispatcher's main loop: dequeue → on empty, signal + backoff;
    /// on a job, rendezvous with the next free worker. Honors the stop
    /// signal at every suspension point.
    pub async fn run(mut self) {
        info!("dispatcher started");
        loop {
            if *self.stop_rx.borrow() {
                info!("dispatcher received stop");
                return;
            }

            match self.job_pool.dequeue().await {
                None => {
                    // Drop-on-no-receiver is intentional: the controller
                    // need not observe every empty-queue instance, one is
                    // enough to trigger a refill.
                    let _ = self.empty_queue_tx.try_send(());
                    debug!(retry_timeout = ?self.retry_timeout, "job pool empty, waiting");
                    tokio::select! {
                        _ = self.stop_rx.changed() => {
                            if *self.stop_rx.borrow() {
                                return;
                            }
                        }
                        _ = tokio::time::sleep(self.retry_timeout) => {}
                    }
                }
                Some(job) => loop {
                    tokio::select! {
                        _ = self.stop_rx.changed() => {
                            if *self.stop_rx.borrow() {
                                return;
                            }
                        }
                        sink = self.rendezvous_rx.recv() => {
                            match sink {
                                Some(sink) => {
                                    let _ = sink.send(job);
                                    break;
                                }
                                None => return,
                            }
                        }
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_queue_signal_fires_when_pool_is_empty() {
        let (dispatcher, _handle, mut empty_rx) =
            Dispatcher::new(DispatcherConfig { retry_timeout: Duration::from_millis(5) });
        let join = tokio::spawn(dispatcher.run());

        tokio::time::timeout(Duration::from_secs(1), empty_rx.recv())
            .await
            .expect("empty-queue signal should fire")
            .unwrap();

        join.abort();
    }

    #[tokio::test]
    async fn job_is_handed_off_to_a_waiting_worker() {
        let (dispatcher, handle, _empty_rx) = Dispatcher::new(DispatcherConfig::default());
        let join = tokio::spawn(dispatcher.run());

        handle.enqueue(Job::height(42)).await;

        let (tx, rx) = oneshot::channel();
        handle.worker_rendezvous.send(tx).await.unwrap();
        let job = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert_eq!(job.id, 42);

        join.abort();
    }

    #[tokio::test]
    async fn stop_unblocks_the_loop() {
        let (dispatcher, handle, _empty_rx) = Dispatcher::new(DispatcherConfig::default());
        let join = tokio::spawn(dispatcher.run());
        handle.stop();
        tokio::time::timeout(Duration::from_secs(1), join).await.unwrap().unwrap();
    }
}
