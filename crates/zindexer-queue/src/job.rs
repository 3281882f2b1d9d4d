use std::collections::VecDeque;

use tokio::sync::Mutex;

/// A unit of dispatchable work. For height-driven indexers `id` is the
/// height; `params` is free-form payload so the same dispatcher can carry
/// non-height work too.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub params: Option<serde_json::Value>,
}

impl Job {
    pub fn height(height: u64) -> Self {
        Job { id: height as i64, params: None }
    }
}

/// FIFO queue of pending jobs, guarded by a single mutex (the async
/// analogue of the original's `sync.Mutex`-protected `eapache/queue`).
#[derive(Default)]
pub struct JobPool {
    queue: Mutex<VecDeque<Job>>,
}

impl JobPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, job: Job) {
        self.queue.lock().await.push_back(job);
    }

    pub async fn enqueue_batch(&self, jobs: impl IntoIterator<Item = Job>) {
        let mut q = self.queue.lock().await;
        q.extend(jobs);
    }

    /// Pops the next job, FIFO order. `None` is the Rust analogue of the
    /// original's `jobId == -1` empty sentinel.
    pub async fn dequeue(&self) -> Option<Job> {
        self.queue.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
