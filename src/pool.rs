//! Bounded worker pool for connection handling.
//!
//! A fixed number of worker tasks pull jobs off an internal queue, so at
//! most `size` jobs run concurrently and excess submissions wait for a free
//! worker. `submit` never blocks the caller. Shutdown is two-phase: wait for
//! a graceful drain, then force-cancel whatever is still running.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::trace;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The pool can no longer run jobs because every worker has died.
#[derive(Debug, Error)]
#[error("worker pool has no live workers")]
pub struct PoolClosed;

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// All queued and in-flight jobs finished within the first window.
    Drained,
    /// In-flight jobs had to be force-cancelled in the second window.
    Cancelled,
    /// Workers were still running after both windows.
    TimedOut,
}

/// Fixed-size pool of worker tasks sharing one job queue.
///
/// Size is fixed for the pool's lifetime. Jobs queue in submission order;
/// each worker runs one job at a time to completion.
pub struct WorkerPool {
    queue: mpsc::UnboundedSender<Job>,
    workers: JoinSet<()>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` worker tasks draining a shared queue.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "pool size must be greater than zero");

        let (queue, jobs) = mpsc::unbounded_channel::<Job>();
        let jobs = Arc::new(Mutex::new(jobs));
        let mut workers = JoinSet::new();

        for worker in 0..size {
            let jobs = Arc::clone(&jobs);
            workers.spawn(async move {
                loop {
                    // The queue lock is held only while waiting for the next
                    // job, never while running one.
                    let job = jobs.lock().await.recv().await;
                    match job {
                        Some(job) => {
                            trace!(worker, "Job started");
                            job.await;
                            trace!(worker, "Job finished");
                        }
                        // Queue closed and fully drained
                        None => break,
                    }
                }
            });
        }

        Self {
            queue,
            workers,
            size,
        }
    }

    /// Number of worker slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Enqueue a job for the next free worker.
    ///
    /// Never waits for a slot; jobs queue internally in submission order.
    /// Fails only if every worker has died (a job panicked on each of them).
    pub fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queue.send(Box::pin(job)).map_err(|_| PoolClosed)
    }

    /// Stop accepting jobs and wait for the workers to finish.
    ///
    /// Phase one waits up to `drain_timeout` for a graceful drain of the
    /// queue and all in-flight jobs. If that window elapses, phase two
    /// force-cancels the workers and waits up to `drain_timeout` again.
    /// Never blocks beyond the two windows; a `TimedOut` outcome means the
    /// pool did not terminate and the caller should proceed regardless.
    pub async fn shutdown(mut self, drain_timeout: Duration) -> DrainOutcome {
        // Closing the queue lets each worker exit once it is drained
        drop(self.queue);

        if timeout(drain_timeout, drain(&mut self.workers)).await.is_ok() {
            return DrainOutcome::Drained;
        }

        self.workers.abort_all();
        if timeout(drain_timeout, drain(&mut self.workers)).await.is_ok() {
            DrainOutcome::Cancelled
        } else {
            DrainOutcome::TimedOut
        }
    }
}

/// Wait for every worker task to finish, ignoring panics and cancellations.
async fn drain(workers: &mut JoinSet<()>) {
    while workers.join_next().await.is_some() {}
}
