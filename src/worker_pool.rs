//! Fixed-size cooperative executor (spec §4.6): bounded submission queue, a 50ms submission
//! timeout, and exactly-once result delivery even across shutdown.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

const SUBMIT_TIMEOUT: Duration = Duration::from_millis(50);

struct Pool {
    tx: async_channel::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

/// A fixed-size pool of worker tasks draining a bounded job queue.
pub struct WorkerPool {
    pool: RwLock<Pool>,
}

/// `4 × CPU count`, the spec's default `max_workers`.
pub fn default_max_workers() -> usize {
    4 * std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        WorkerPool { pool: RwLock::new(spawn_pool(max_workers.max(1))) }
    }

    /// Submits `fut` to run on the pool. Returns `None` if the queue stayed full for the
    /// submission timeout (or the pool was stopped); the caller should treat that as a rejected
    /// submission, not an error worth propagating to the client as anything but a transient one.
    pub async fn submit<F, T>(&self, fut: F) -> Option<oneshot::Receiver<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = fut.await;
            let _ = result_tx.send(result);
        });
        let tx = self.pool.read().await.tx.clone();
        match tokio::time::timeout(SUBMIT_TIMEOUT, tx.send(job)).await {
            Ok(Ok(())) => Some(result_rx),
            _ => None,
        }
    }

    /// Closes the queue and waits for every worker to finish its current job. Idempotent: a pool
    /// that is already stopped simply observes an empty worker list and returns immediately.
    pub async fn stop(&self) {
        let mut pool = self.pool.write().await;
        pool.tx.close();
        let workers = std::mem::take(&mut pool.workers);
        drop(pool);
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// Stops the current pool, then starts a fresh one with `n` workers. Held under one write
    /// lock for the duration, so no submission can race between the old pool draining and the
    /// new one accepting work.
    pub async fn resize(&self, n: usize) {
        let mut pool = self.pool.write().await;
        pool.tx.close();
        let workers = std::mem::take(&mut pool.workers);
        for worker in workers {
            let _ = worker.await;
        }
        *pool = spawn_pool(n.max(1));
    }

    pub async fn worker_count(&self) -> usize {
        self.pool.read().await.workers.len()
    }
}

fn spawn_pool(max_workers: usize) -> Pool {
    let depth = max_workers * 2;
    let (tx, rx) = async_channel::bounded(depth);
    let workers = (0..max_workers)
        .map(|_| {
            let rx = rx.clone();
            tokio::spawn(async move {
                while let Ok(job) = rx.recv().await {
                    job.await;
                }
            })
        })
        .collect();
    Pool { tx, workers }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitted_work_delivers_its_result() {
        let pool = WorkerPool::new(2);
        let rx = pool.submit(async { 1 + 1 }).await.unwrap();
        assert_eq!(rx.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_drains_in_flight_work() {
        let pool = WorkerPool::new(1);
        let rx = pool.submit(async { 42 }).await.unwrap();
        pool.stop().await;
        pool.stop().await;
        assert_eq!(rx.await.unwrap(), 42);
        assert_eq!(pool.worker_count().await, 0);
    }

    #[tokio::test]
    async fn resize_replaces_the_pool_and_still_accepts_new_work() {
        let pool = WorkerPool::new(1);
        pool.resize(3).await;
        assert_eq!(pool.worker_count().await, 3);
        let rx = pool.submit(async { "ok" }).await.unwrap();
        assert_eq!(rx.await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn a_dropped_receiver_does_not_panic_the_worker() {
        let pool = WorkerPool::new(1);
        let rx = pool.submit(async { 1 }).await.unwrap();
        drop(rx);
        // give the worker a moment to run the job against the now-dropped receiver.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.worker_count().await, 1);
    }
}
