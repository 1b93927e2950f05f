//! Race condition vs. thread safety on a shared counter.
//!
//! Both counters share the [`Counter`] trait so one runner drives either.
//! The unsynchronized one reads and writes in two separate steps, which is
//! exactly the `count++` that loses updates when threads interleave.

use crate::error::{Result, UnitError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

pub trait Counter: Send + Sync {
    fn increment(&self);
    fn count(&self) -> u64;
    fn label(&self) -> &'static str;
}

/// Read, then write. Nothing stops another thread from writing in between.
#[derive(Debug, Default)]
pub struct UnsyncCounter {
    count: AtomicU64,
}

impl UnsyncCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for UnsyncCounter {
    fn increment(&self) {
        let current = self.count.load(Ordering::Relaxed);
        // Give the scheduler a chance to run someone else between the read
        // and the write, so lost updates show up even on one core.
        thread::yield_now();
        self.count.store(current + 1, Ordering::Relaxed);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn label(&self) -> &'static str {
        "unsynchronized"
    }
}

/// The whole read-modify-write happens under one lock.
#[derive(Debug, Default)]
pub struct SyncCounter {
    count: Mutex<u64>,
}

impl SyncCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for SyncCounter {
    fn increment(&self) {
        let mut count = self.count.lock();
        *count += 1;
    }

    fn count(&self) -> u64 {
        *self.count.lock()
    }

    fn label(&self) -> &'static str {
        "synchronized"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceReport {
    pub expected: u64,
    pub actual: u64,
}

impl RaceReport {
    pub fn lost_updates(&self) -> u64 {
        self.expected.saturating_sub(self.actual)
    }

    pub fn is_exact(&self) -> bool {
        self.expected == self.actual
    }
}

/// Spawn `workers` threads that each call `increment` `increments` times,
/// join them all, then read the counter once.
pub fn run_race<C>(counter: Arc<C>, workers: usize, increments: u64) -> Result<RaceReport>
where
    C: Counter + 'static,
{
    info!(counter = counter.label(), workers, increments, "starting race");

    let mut handles = Vec::with_capacity(workers);
    for id in 1..=workers {
        let name = format!("counter-worker-{}", id);
        let counter = Arc::clone(&counter);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            for _ in 0..increments {
                counter.increment();
            }
            debug!(worker = id, "done incrementing");
        })?;
        handles.push((name, handle));
    }

    // Join everyone before reporting, even if an earlier worker panicked.
    let mut first_panic = None;
    for (name, handle) in handles {
        if handle.join().is_err() && first_panic.is_none() {
            first_panic = Some(name);
        }
    }
    if let Some(name) = first_panic {
        return Err(UnitError::WorkerPanicked { name });
    }

    let report = RaceReport {
        expected: workers as u64 * increments,
        actual: counter.count(),
    };
    info!(
        counter = counter.label(),
        expected = report.expected,
        actual = report.actual,
        lost = report.lost_updates(),
        "race finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_thread_counts_exactly() {
        let counter = UnsyncCounter::new();
        for _ in 0..100 {
            counter.increment();
        }
        assert_eq!(counter.count(), 100);
    }

    #[test]
    fn test_sync_counter_is_exact_every_run() {
        for _ in 0..5 {
            let report = run_race(Arc::new(SyncCounter::new()), 10, 1000).unwrap();
            assert_eq!(report.expected, 10_000);
            assert_eq!(report.actual, 10_000);
            assert!(report.is_exact());
        }
    }

    #[test]
    fn test_unsync_counter_never_overcounts_and_loses_updates() {
        let mut lost_somewhere = false;

        for _ in 0..20 {
            let report = run_race(Arc::new(UnsyncCounter::new()), 8, 2000).unwrap();
            assert!(report.actual <= report.expected);
            if report.lost_updates() > 0 {
                lost_somewhere = true;
                break;
            }
        }

        assert!(lost_somewhere, "no trial lost an update");
    }

    #[test]
    fn test_zero_workers() {
        let report = run_race(Arc::new(SyncCounter::new()), 0, 1000).unwrap();
        assert_eq!(report, RaceReport { expected: 0, actual: 0 });
    }

    struct BrokenCounter;

    impl Counter for BrokenCounter {
        fn increment(&self) {
            panic!("increment failed");
        }

        fn count(&self) -> u64 {
            0
        }

        fn label(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        let err = run_race(Arc::new(BrokenCounter), 3, 10).unwrap_err();
        match err {
            UnitError::WorkerPanicked { name } => assert!(name.starts_with("counter-worker-")),
            other => panic!("expected WorkerPanicked, got {:?}", other),
        }
    }
}
