//! Creating threads and watching them live and die.
//!
//! Rust has no thread object that exists before it runs, so `New` here is the
//! configured `thread::Builder`, `Running` is a handle whose thread has not
//! finished, and `Terminated` is a finished or joined one.

use crate::error::{Result, UnitError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    New,
    Running,
    Terminated,
}

impl ThreadState {
    pub fn of<T>(handle: &JoinHandle<T>) -> Self {
        if handle.is_finished() {
            ThreadState::Terminated
        } else {
            ThreadState::Running
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub name: String,
    pub thread_id: String,
    pub iterations_run: u32,
}

/// Start a named thread that logs `iterations` steps, pausing between them.
pub fn spawn_named(name: &str, iterations: u32, pause: Duration) -> Result<JoinHandle<WorkerReport>> {
    let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
        let current = thread::current();
        let name = current.name().unwrap_or("unnamed").to_string();
        let thread_id = format!("{:?}", current.id());
        info!(thread = %name, id = %thread_id, "started");

        let mut iterations_run = 0;
        for step in 1..=iterations {
            info!(thread = %name, step, "iteration");
            iterations_run += 1;
            thread::sleep(pause);
        }

        info!(thread = %name, "finished");
        WorkerReport {
            name,
            thread_id,
            iterations_run,
        }
    })?;

    Ok(handle)
}

/// Start every name in `names` at once and join them in order.
pub fn run_named(names: &[&str], iterations: u32, pause: Duration) -> Result<Vec<WorkerReport>> {
    let handles = names
        .iter()
        .map(|name| spawn_named(name, iterations, pause).map(|handle| (*name, handle)))
        .collect::<Result<Vec<_>>>()?;

    handles
        .into_iter()
        .map(|(name, handle)| {
            handle.join().map_err(|_| UnitError::WorkerPanicked {
                name: name.to_string(),
            })
        })
        .collect()
}

/// Spawn one thread and record the states the spawning thread sees:
/// before spawn, right after spawn, and after join.
pub fn observe_lifecycle(iterations: u32, pause: Duration) -> Result<Vec<ThreadState>> {
    let mut observed = vec![ThreadState::New];
    info!(state = ?ThreadState::New, "builder configured");

    let handle = spawn_named("lifecycle-demo", iterations, pause)?;
    let state = ThreadState::of(&handle);
    info!(?state, "after spawn");
    observed.push(state);

    handle.join().map_err(|_| UnitError::WorkerPanicked {
        name: "lifecycle-demo".to_string(),
    })?;
    info!(state = ?ThreadState::Terminated, "joined");
    observed.push(ThreadState::Terminated);

    Ok(observed)
}
