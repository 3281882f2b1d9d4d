use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::error;

use crate::job::Job;

/// A worker's sole capability. Implementors are not re-entrant: the pool
/// never calls `do_work` again on the same worker until the previous call
/// returned.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn do_work(&self, job: Job);
}

/// Builds a worker for a given id. Workers share no state by construction
/// — each gets its own instance from this constructor.
pub type WorkerConstructor = Arc<dyn Fn(String) -> Arc<dyn Worker> + Send + Sync>;

/// Spawns `count` workers, each publishing its job-sink onto
/// `rendezvous_tx` when idle and blocking for either a job or `stop_rx`
/// to flip. A panic inside `do_work` is caught at the worker boundary
/// (spec.md §7 "worker-level panic") via an inner `tokio::spawn` + join,
/// so one bad job drops only itself, not the worker's poll loop.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn build(
        count: usize,
        constructor: WorkerConstructor,
        rendezvous_tx: mpsc::Sender<oneshot::Sender<Job>>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        let handles = (0..count)
            .map(|i| {
                let id = format!("worker.{i}");
                let worker = constructor(id.clone());
                spawn_worker(id, worker, rendezvous_tx.clone(), stop_rx.clone())
            })
            .collect();
        Self { handles }
    }

    /// Waits for every worker task to exit (normally after its stop
    /// signal flips and it finishes any in-flight job).
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn spawn_worker(
    id: String,
    worker: Arc<dyn Worker>,
    rendezvous_tx: mpsc::Sender<oneshot::Sender<Job>>,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if *stop_rx.borrow() {
                return;
            }

            let (sink, job_rx) = oneshot::channel();
            if rendezvous_tx.send(sink).await.is_err() {
                return;
            }

            tokio::select! {
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        return;
                    }
                }
                job = job_rx => {
                    if let Ok(job) = job {
                        let worker = worker.clone();
                        let worker_id = id.clone();
                        let job_id = job.id;
                        if let Err(panic) = tokio::spawn(async move { worker.do_work(job).await }).await {
                            error!(worker = worker_id.as_str(), job_id, ?panic, "worker job panicked, dropping job");
                        }
                    }
                }
            }
        }
    })
}
