//! # Multithreading in Rust
//!
//! Demonstrations for the concurrency unit of the syllabus. Each module holds
//! one piece of shared state and a runner that spawns a handful of OS threads,
//! joins them, and hands back a report the binaries print.
//!
//! ## Example 1: Thread Creation and Lifecycle
//! - Named threads with `thread::Builder`
//! - Observing New -> Running -> Terminated from the spawning thread
//! - Tasks that return a value through the worker pool
//!
//! ## Example 2: Synchronization and Thread Safety
//! - Race condition on an unsynchronized counter
//! - The same counter behind a `Mutex`
//! - A bank account whose operations serialize on one lock
//!
//! ## Example 3: Inter-Thread Communication and Deadlock
//! - Producer-consumer over a bounded queue with two condition variables
//! - Two workers taking two locks in opposite order, caught by a deadline
//! - The same workers with a single global lock order
//! - A fixed-size worker pool that drains before shutdown

pub mod account;
pub mod buffer;
pub mod config;
pub mod counter;
pub mod deadlock;
pub mod demo;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod pool;

pub use config::DemoConfig;
pub use error::{Result, UnitError};
