//! Fixed-size worker pool.
//!
//! Jobs go into an unbounded crossbeam channel, so `submit` never blocks.
//! Every worker holds a clone of the receiver; whichever is idle takes the
//! next job. Shutdown drops the sender: workers finish what is already
//! queued, see the channel disconnect, and exit.

use crate::error::{Result, UnitError};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct PoolStats {
    executed: AtomicUsize,
    panicked: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: Option<Sender<Job>>,
    stats: Arc<PoolStats>,
}

struct Worker {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(id: usize, receiver: Receiver<Job>, stats: Arc<PoolStats>) -> Result<Self> {
        let name = format!("pool-worker-{}", id);
        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!("worker started");
            while let Ok(job) = receiver.recv() {
                let running = stats.running.fetch_add(1, Ordering::SeqCst) + 1;
                stats.peak_running.fetch_max(running, Ordering::SeqCst);

                let outcome = panic::catch_unwind(AssertUnwindSafe(job));

                stats.running.fetch_sub(1, Ordering::SeqCst);
                match outcome {
                    Ok(()) => {
                        stats.executed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(_) => {
                        stats.panicked.fetch_add(1, Ordering::SeqCst);
                        error!("task panicked, worker keeps running");
                    }
                }
            }
            debug!("queue closed, worker shutting down");
        })?;

        Ok(Worker {
            name,
            thread: Some(thread),
        })
    }
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(UnitError::InvalidPoolSize(size));
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let stats = Arc::new(PoolStats::default());

        let workers = (0..size)
            .map(|id| Worker::spawn(id + 1, receiver.clone(), Arc::clone(&stats)))
            .collect::<Result<Vec<_>>>()?;

        info!(size, "worker pool started");
        Ok(WorkerPool {
            workers,
            sender: Some(sender),
            stats,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` for some worker. Fails only once the pool is shut down.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(UnitError::PoolShutDown)?;
        sender
            .send(Box::new(job))
            .map_err(|_| UnitError::PoolShutDown)
    }

    /// Like `submit`, but hands back a handle to the task's return value.
    pub fn submit_with_result<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        self.submit(move || {
            let _ = result_tx.send(task());
        })?;
        Ok(TaskHandle { result: result_rx })
    }

    pub fn executed(&self) -> usize {
        self.stats.executed.load(Ordering::SeqCst)
    }

    pub fn panicked(&self) -> usize {
        self.stats.panicked.load(Ordering::SeqCst)
    }

    /// Most tasks ever seen running at the same moment.
    pub fn peak_concurrency(&self) -> usize {
        self.stats.peak_running.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.is_none()
    }

    /// Stop accepting tasks, let the workers drain the queue, and join them.
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.sender.take().is_some() {
            info!(workers = self.workers.len(), "shutting down worker pool");
        }

        let mut first_panic = None;
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() && first_panic.is_none() {
                    first_panic = Some(worker.name.clone());
                }
            }
        }

        match first_panic {
            Some(name) => Err(UnitError::WorkerPanicked { name }),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// The pending result of a task submitted with `submit_with_result`.
#[derive(Debug)]
pub struct TaskHandle<T> {
    result: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has run. A task that panicked never sends its
    /// value, which shows up here as `TaskLost`.
    pub fn wait(self) -> Result<T> {
        self.result.recv().map_err(|_| UnitError::TaskLost)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub workers: usize,
    pub submitted: usize,
    pub executed: usize,
    pub peak_concurrency: usize,
    pub threads_used: BTreeSet<String>,
    pub elapsed: Duration,
}

/// Push `tasks` sleeping tasks through a pool of `workers` threads and wait
/// for the pool to drain.
pub fn run_pool(workers: usize, tasks: usize, task_duration: Duration) -> Result<PoolReport> {
    let mut pool = WorkerPool::new(workers)?;
    let threads_used = Arc::new(Mutex::new(BTreeSet::new()));
    let start = Instant::now();

    for task_id in 1..=tasks {
        let threads_used = Arc::clone(&threads_used);
        pool.submit(move || {
            let name = thread::current().name().unwrap_or("unnamed").to_string();
            info!(task = task_id, "executing");
            thread::sleep(task_duration);
            threads_used.lock().insert(name);
            info!(task = task_id, "completed");
        })?;
    }

    pool.shutdown()?;
    let elapsed = start.elapsed();
    let threads_used = std::mem::take(&mut *threads_used.lock());

    Ok(PoolReport {
        workers,
        submitted: tasks,
        executed: pool.executed(),
        peak_concurrency: pool.peak_concurrency(),
        threads_used,
        elapsed,
    })
}
