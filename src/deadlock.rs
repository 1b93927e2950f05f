//! Deadlock and its cure.
//!
//! Every worker takes both resources of a [`LockPair`], in the order its
//! [`LockOrder`] says. Opposite orders give the classic circular wait. The
//! harness cannot see a wait-for graph; it only notices that not everyone
//! finished before a deadline, reports the stragglers, and then interrupts
//! them. Workers therefore never block unconditionally: they retry timed lock
//! attempts and check the interrupt flag between attempts.

use crate::error::{Result, UnitError};
use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const ATTEMPT_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct Resource {
    name: &'static str,
    lock: Mutex<()>,
}

impl Resource {
    fn new(name: &'static str) -> Self {
        Self { name, lock: Mutex::new(()) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Two resources with no ordering of their own.
#[derive(Debug)]
pub struct LockPair {
    first: Resource,
    second: Resource,
}

impl Default for LockPair {
    fn default() -> Self {
        Self::new()
    }
}

impl LockPair {
    pub fn new() -> Self {
        Self {
            first: Resource::new("Resource-1"),
            second: Resource::new("Resource-2"),
        }
    }

    fn in_order(&self, order: LockOrder) -> (&Resource, &Resource) {
        match order {
            LockOrder::FirstThenSecond => (&self.first, &self.second),
            LockOrder::SecondThenFirst => (&self.second, &self.first),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOrder {
    FirstThenSecond,
    SecondThenFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Unlocked,
    HoldingFirst,
    AttemptingSecond,
    HoldingBoth,
    Released,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckWorker {
    pub name: String,
    pub state: WorkerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlockVerdict {
    Completed { workers: usize, elapsed: Duration },
    /// Somebody was still waiting at the deadline. `stuck` records where each
    /// straggler was at that moment, before it got interrupted.
    Suspected { stuck: Vec<StuckWorker> },
}

impl DeadlockVerdict {
    pub fn is_completed(&self) -> bool {
        matches!(self, DeadlockVerdict::Completed { .. })
    }
}

struct LockWorker {
    name: String,
    order: LockOrder,
    hold: Duration,
    state: Arc<Mutex<WorkerState>>,
    interrupted: Arc<AtomicBool>,
    done: Sender<String>,
}

impl LockWorker {
    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// Keep trying until the lock is ours or the harness interrupts us.
    fn acquire<'a>(&self, resource: &'a Resource) -> Option<MutexGuard<'a, ()>> {
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(guard) = resource.lock.try_lock_for(ATTEMPT_SLICE) {
                return Some(guard);
            }
        }
    }

    fn run(self, pair: &LockPair) {
        let (first_resource, second_resource) = pair.in_order(self.order);

        let Some(first) = self.acquire(first_resource) else {
            self.set_state(WorkerState::Interrupted);
            warn!(worker = %self.name, "interrupted before taking its first lock");
            return;
        };
        self.set_state(WorkerState::HoldingFirst);
        info!(worker = %self.name, resource = first_resource.name(), "locked");

        thread::sleep(self.hold);

        self.set_state(WorkerState::AttemptingSecond);
        info!(worker = %self.name, resource = second_resource.name(), "waiting");

        let Some(second) = self.acquire(second_resource) else {
            self.set_state(WorkerState::Interrupted);
            warn!(
                worker = %self.name,
                holding = first_resource.name(),
                "interrupted while waiting"
            );
            return;
        };
        self.set_state(WorkerState::HoldingBoth);
        info!(worker = %self.name, resource = second_resource.name(), "locked");

        drop(second);
        drop(first);
        self.set_state(WorkerState::Released);
        info!(worker = %self.name, "completed");

        let _ = self.done.send(self.name.clone());
    }
}

/// Start one worker per entry of `orders` (named `Thread-1`, `Thread-2`, ...)
/// and wait up to `deadline` for all of them to release both locks.
///
/// Always returns: on a missed deadline the stragglers are interrupted and
/// joined before the verdict comes back.
pub fn run_lock_workers(
    pair: Arc<LockPair>,
    orders: &[LockOrder],
    hold: Duration,
    deadline: Duration,
) -> Result<DeadlockVerdict> {
    let (done_tx, done_rx) = channel::unbounded();
    let interrupted = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let mut workers = Vec::with_capacity(orders.len());
    for (index, &order) in orders.iter().enumerate() {
        let name = format!("Thread-{}", index + 1);
        let state = Arc::new(Mutex::new(WorkerState::Unlocked));
        let worker = LockWorker {
            name: name.clone(),
            order,
            hold,
            state: Arc::clone(&state),
            interrupted: Arc::clone(&interrupted),
            done: done_tx.clone(),
        };
        let pair = Arc::clone(&pair);
        let handle = match thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run(&pair))
        {
            Ok(handle) => handle,
            Err(err) => {
                // Workers already started must not be left waiting forever.
                interrupted.store(true, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        workers.push((name, state, handle));
    }
    drop(done_tx);

    let deadline_at = start + deadline;
    let mut finished = Vec::with_capacity(workers.len());
    while finished.len() < workers.len() {
        match done_rx.recv_deadline(deadline_at) {
            Ok(name) => finished.push(name),
            Err(_) => break,
        }
    }

    let stuck: Vec<StuckWorker> = workers
        .iter()
        .filter(|(name, _, _)| !finished.contains(name))
        .map(|(name, state, _)| StuckWorker {
            name: name.clone(),
            state: *state.lock(),
        })
        .collect();

    let verdict = if stuck.is_empty() {
        let elapsed = start.elapsed();
        info!(workers = workers.len(), ?elapsed, "all workers completed, no deadlock");
        DeadlockVerdict::Completed {
            workers: workers.len(),
            elapsed,
        }
    } else {
        warn!(
            stuck = stuck.len(),
            ?deadline,
            "deadlock suspected, interrupting waiting workers"
        );
        interrupted.store(true, Ordering::SeqCst);
        DeadlockVerdict::Suspected { stuck }
    };

    for (name, _, handle) in workers {
        handle
            .join()
            .map_err(|_| UnitError::WorkerPanicked { name })?;
    }

    Ok(verdict)
}

/// Two workers, opposite lock orders.
pub fn provoke_deadlock(hold: Duration, deadline: Duration) -> Result<DeadlockVerdict> {
    run_lock_workers(
        Arc::new(LockPair::new()),
        &[LockOrder::FirstThenSecond, LockOrder::SecondThenFirst],
        hold,
        deadline,
    )
}

/// `workers` workers, all taking Resource-1 before Resource-2.
pub fn ordered_locking(workers: usize, hold: Duration, deadline: Duration) -> Result<DeadlockVerdict> {
    let orders = vec![LockOrder::FirstThenSecond; workers];
    run_lock_workers(Arc::new(LockPair::new()), &orders, hold, deadline)
}
