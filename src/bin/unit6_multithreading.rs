//! Unit 6: Multithreading
//!
//! Runs every example in syllabus order.
//!
//! Run with: cargo run --bin unit6_multithreading [config.toml]

use colored::Colorize;
use multithreading_unit::{demo, logging, Result};

fn section(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("{}", title.bold());
    println!("{}", "-".repeat(70));
}

fn run() -> Result<()> {
    let config = demo::config_from_args()?;

    section("EXAMPLE 1: Thread Creation and Lifecycle");
    demo::report(demo::thread_creation(&config));

    section("EXAMPLE 2: Synchronization and Thread Safety");
    demo::report(demo::race_condition(&config));
    demo::report(demo::bank_account(&config));

    section("EXAMPLE 3: Inter-Thread Communication and Deadlock");
    demo::report(demo::producer_consumer(&config));
    demo::report(demo::deadlock(&config));
    demo::report(demo::thread_pool(&config));

    section("MULTITHREADING SUMMARY");
    println!("Creation     : thread::spawn / thread::Builder, join() to wait");
    println!("Shared state : Arc<Mutex<T>> for mutation, atomics for counters");
    println!("Signalling   : Condvar wait in a loop, notify_one / notify_all");
    println!("Deadlock     : circular wait; prevent it with one lock order");
    println!("Thread pool  : fixed workers pulling jobs from a channel");
    println!("{}", "=".repeat(70));
    Ok(())
}

fn main() {
    logging::init();
    demo::report(run());
}
