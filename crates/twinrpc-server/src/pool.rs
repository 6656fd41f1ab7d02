//! Bounded, growable worker pool.
//!
//! A set of worker tasks drains a shared queue. `enqueue` never blocks the
//! submitter: the task is queued and, when the queue is backed up and spare
//! capacity exists, one extra worker is spawned up to `max_workers`. Surplus
//! workers retire after an idle grace period, back down to `min_workers`.
//! `stop` closes intake, lets the workers drain every queued task, and joins
//! them. A panicking task is caught at the worker boundary and logged; it
//! never takes the worker or the pool down with it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, error};

/// How long a surplus worker waits for work before retiring.
const IDLE_GRACE: Duration = Duration::from_secs(30);

/// A unit of work for the pool.
pub type PoolTask = BoxFuture<'static, ()>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool is stopped")]
    Stopped,
}

struct PoolShared {
    receiver: Mutex<mpsc::UnboundedReceiver<PoolTask>>,
    queued: AtomicUsize,
    live: AtomicUsize,
    min_workers: usize,
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    // Taken on stop; a closed intake is how workers learn to exit.
    sender: std::sync::Mutex<Option<mpsc::UnboundedSender<PoolTask>>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    max_workers: usize,
}

impl WorkerPool {
    /// Creates a stopped pool; call [`WorkerPool::start`] before enqueuing.
    /// `max_workers` is clamped to at least one worker and never below
    /// `min_workers`.
    pub fn new(min_workers: usize, max_workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(PoolShared {
                receiver: Mutex::new(receiver),
                queued: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                min_workers,
            }),
            sender: std::sync::Mutex::new(Some(sender)),
            workers: std::sync::Mutex::new(Vec::new()),
            max_workers: max_workers.max(min_workers).max(1),
        }
    }

    /// Spins up the resident workers.
    pub fn start(&self) {
        for _ in 0..self.shared.min_workers {
            self.spawn_worker(true);
        }
    }

    /// Queues a task without blocking the submitter. Spawns one extra worker
    /// when the queue is backed up and the pool has spare capacity.
    pub fn enqueue(&self, task: PoolTask) -> Result<(), PoolError> {
        // The grow decision stays under the intake lock: a worker spawned
        // here is in the handle set before stop() can take it, so stop()
        // always joins it.
        let guard = self.sender.lock().expect("pool sender lock poisoned");
        let sender = guard.as_ref().ok_or(PoolError::Stopped)?;
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(task).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::Stopped);
        }

        if self.shared.queued.load(Ordering::SeqCst) > 0
            && self.shared.live.load(Ordering::SeqCst) < self.max_workers
        {
            self.spawn_worker(false);
        }
        Ok(())
    }

    /// Stops accepting tasks, drains the queue, and joins every worker.
    /// Blocks until all queued and in-flight tasks have completed.
    pub async fn stop(&self) {
        drop(self.sender.lock().expect("pool sender lock poisoned").take());

        let handles = std::mem::take(&mut *self.workers.lock().expect("pool worker lock poisoned"));
        for handle in handles {
            // A worker that panicked outside a task is already logged
            let _ = handle.await;
        }
        debug!("worker pool stopped");
    }

    /// Tasks queued but not yet picked up.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Workers currently alive.
    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    fn spawn_worker(&self, resident: bool) {
        let shared = Arc::clone(&self.shared);
        shared.live.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(worker_loop(shared, resident));
        let mut workers = self.workers.lock().expect("pool worker lock poisoned");
        // Reap retired workers so the handle set stays bounded under churn
        workers.retain(|worker| !worker.is_finished());
        workers.push(handle);
    }
}

async fn worker_loop(shared: Arc<PoolShared>, resident: bool) {
    loop {
        // Workers take turns waiting on the shared receiver; the lock is
        // released as soon as a task (or closure) is observed. The surplus
        // grace timer covers the lock wait too, since a resident worker can
        // camp on the receiver indefinitely.
        let next = if resident {
            shared.receiver.lock().await.recv().await
        } else {
            let recv = async { shared.receiver.lock().await.recv().await };
            match timeout(IDLE_GRACE, recv).await {
                Ok(task) => task,
                // Idle surplus worker: retire if the pool is above its floor
                Err(_) => {
                    if shared.queued.load(Ordering::SeqCst) == 0
                        && shared.live.load(Ordering::SeqCst) > shared.min_workers
                    {
                        break;
                    }
                    continue;
                }
            }
        };

        match next {
            Some(task) => {
                shared.queued.fetch_sub(1, Ordering::SeqCst);
                if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                    error!("pool task panicked: {}", panic_message(panic.as_ref()));
                }
            }
            // Intake closed and queue drained
            None => break,
        }
    }
    shared.live.fetch_sub(1, Ordering::SeqCst);
    debug!("worker exiting");
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
