//! Narrated runs of each example, shared by the binaries.
//!
//! Structured events go through `tracing`; what a student reads top to
//! bottom is printed here.

use crate::account::{self, Account, Transaction};
use crate::buffer;
use crate::config::{AccountConfig, DemoConfig};
use crate::counter::{self, SyncCounter, UnsyncCounter};
use crate::deadlock::{self, DeadlockVerdict};
use crate::error::Result;
use crate::lifecycle;
use crate::pool::{self, WorkerPool};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

/// Config from the first command-line argument if there is one, otherwise
/// the classroom defaults.
pub fn config_from_args() -> Result<DemoConfig> {
    match std::env::args().nth(1) {
        Some(path) => DemoConfig::load(Path::new(&path)),
        None => Ok(DemoConfig::default()),
    }
}

/// Print a failed demo instead of letting it take the process down.
pub fn report(result: Result<()>) {
    if let Err(err) = result {
        eprintln!("{} {}", "demo failed:".red().bold(), err);
    }
}

fn heading(title: &str) {
    println!("\n{}", format!("=== {} ===", title).bold().cyan());
}

fn key_points(points: &[&str]) {
    println!("\n{}", "=== Key Points ===".bold());
    for (i, point) in points.iter().enumerate() {
        println!("{}. {}", i + 1, point);
    }
}

pub fn thread_creation(config: &DemoConfig) -> Result<()> {
    let settings = &config.lifecycle;

    heading("Creating Named Threads");
    let reports = lifecycle::run_named(&["Worker-1", "Worker-2"], 3, settings.pause())?;
    for report in &reports {
        println!(
            "{} ({}) ran {} iterations",
            report.name, report.thread_id, report.iterations_run
        );
    }

    heading("Thread Lifecycle");
    let states = lifecycle::observe_lifecycle(settings.iterations, settings.pause())?;
    for state in &states {
        println!("Observed state: {:?}", state);
    }

    heading("Tasks That Return a Value");
    let mut pool = WorkerPool::new(2)?;
    let first = pool.submit_with_result(|| (1..=10u32).sum::<u32>())?;
    let second = pool.submit_with_result(|| (1..=20u32).sum::<u32>())?;
    let (first, second) = (first.wait()?, second.wait()?);
    pool.shutdown()?;
    println!("Task-1 result: {}", first);
    println!("Task-2 result: {}", second);
    println!("Total: {}", first + second);

    key_points(&[
        "thread::Builder names a thread before it starts",
        "JoinHandle::is_finished tells running from terminated",
        "join() waits for the thread and hands back its result",
        "A pool task can return a value through a handle",
    ]);
    Ok(())
}

pub fn race_condition(config: &DemoConfig) -> Result<()> {
    let settings = &config.counter;

    heading("Race Condition (Without Synchronization)");
    println!("Available cores: {}", num_cpus::get());
    let report = counter::run_race(
        Arc::new(UnsyncCounter::new()),
        settings.workers,
        settings.increments,
    )?;
    println!("Expected count: {}", report.expected);
    println!("Actual count:   {}", report.actual);
    if report.is_exact() {
        println!("{}", "No updates lost this time, run it again".yellow());
    } else {
        println!(
            "{}",
            format!("Lost {} updates to the race", report.lost_updates()).red()
        );
    }

    heading("Thread Safety (With a Mutex)");
    let report = counter::run_race(
        Arc::new(SyncCounter::new()),
        settings.workers,
        settings.increments,
    )?;
    println!("Expected count: {}", report.expected);
    println!("Actual count:   {}", report.actual);
    println!("{}", "Every increment counted".green());

    key_points(&[
        "count += 1 is a read, an add and a write",
        "Interleaved threads overwrite each other's writes",
        "A Mutex makes the whole read-modify-write one step",
    ]);
    Ok(())
}

/// Widened so that a deposit and a later withdrawal near `u64::MAX` still
/// add up, whatever order the threads ran in.
fn expected_balance(settings: &AccountConfig) -> i128 {
    i128::from(settings.initial_balance) + i128::from(settings.first_deposit)
        + i128::from(settings.second_deposit)
        - i128::from(settings.withdrawal)
}

pub fn bank_account(config: &DemoConfig) -> Result<()> {
    let settings = &config.account;

    heading("Synchronized Bank Account");
    let account = Arc::new(Account::new(
        settings.holder.clone(),
        settings.initial_balance,
        settings.processing_delay(),
    ));
    println!("Initial balance for {}: {}", account.holder(), account.balance());

    let report = account::run_transfers(
        Arc::clone(&account),
        &[
            Transaction::Deposit(settings.first_deposit),
            Transaction::Withdraw(settings.withdrawal),
            Transaction::Deposit(settings.second_deposit),
        ],
    )?;

    for (thread, transaction) in &report.rejected {
        println!("{} could not complete {:?}", thread, transaction);
    }
    println!("Final balance: {}", report.final_balance);
    if report.rejected.is_empty() {
        println!(
            "Expected: {} + {} - {} + {} = {}",
            settings.initial_balance,
            settings.first_deposit,
            settings.withdrawal,
            settings.second_deposit,
            expected_balance(settings)
        );
    }

    key_points(&[
        "Each operation holds the account lock from start to finish",
        "Other threads wait their turn instead of interleaving",
        "Insufficient funds is an answer, not a crash",
    ]);
    Ok(())
}

pub fn producer_consumer(config: &DemoConfig) -> Result<()> {
    let settings = &config.buffer;

    heading("Producer-Consumer");
    println!(
        "Capacity {}, producer every {:?}, consumer every {:?}",
        settings.capacity,
        settings.producer_pace(),
        settings.consumer_pace()
    );
    let report = buffer::run_producer_consumer(
        settings.capacity,
        settings.items,
        settings.producer_pace(),
        settings.consumer_pace(),
    )?;

    println!("Consumed: {:?}", report.consumed);
    println!("In order: {}", report.in_order());
    println!(
        "Peak buffer size: {} / {}",
        report.stats.high_water, settings.capacity
    );
    println!("Producer waited {} times", report.stats.producer_waits);
    println!("Consumer waited {} times", report.stats.consumer_waits);

    key_points(&[
        "A Condvar lets a thread sleep until the state it needs appears",
        "Waiting releases the lock; waking re-acquires it",
        "Always re-check the condition in a loop after waking",
        "Separate condvars wake only the other side",
    ]);
    Ok(())
}

pub fn deadlock(config: &DemoConfig) -> Result<()> {
    let settings = &config.deadlock;

    heading("Deadlock");
    println!("Thread-1 takes Resource-1 then Resource-2");
    println!("Thread-2 takes Resource-2 then Resource-1");
    match deadlock::provoke_deadlock(settings.hold(), settings.deadline())? {
        DeadlockVerdict::Suspected { stuck } => {
            println!("{}", "DEADLOCK SUSPECTED".red().bold());
            for worker in &stuck {
                println!("{} stuck in {:?}", worker.name, worker.state);
            }
            println!("Both threads were interrupted after {:?}", settings.deadline());
        }
        DeadlockVerdict::Completed { elapsed, .. } => {
            println!("The threads got lucky and finished in {:?}", elapsed);
        }
    }

    heading("Deadlock Prevention");
    println!("Every thread takes Resource-1 before Resource-2");
    match deadlock::ordered_locking(settings.ordered_workers, settings.hold(), settings.deadline() * 4)? {
        DeadlockVerdict::Completed { workers, elapsed } => {
            println!(
                "{}",
                format!("No deadlock: {} threads completed in {:?}", workers, elapsed).green()
            );
        }
        DeadlockVerdict::Suspected { stuck } => {
            println!("{} threads still waiting at the deadline", stuck.len());
        }
    }

    key_points(&[
        "Deadlock needs a circular wait",
        "One global lock order makes a cycle impossible",
        "A deadline only detects the symptom, it does not resolve it",
    ]);
    Ok(())
}

pub fn thread_pool(config: &DemoConfig) -> Result<()> {
    let settings = &config.pool;

    heading("Thread Pool");
    println!(
        "Submitting {} tasks to a pool of {} threads",
        settings.tasks, settings.workers
    );
    let report = pool::run_pool(settings.workers, settings.tasks, settings.task_duration())?;

    println!("Executed: {} / {}", report.executed, report.submitted);
    println!("Peak concurrency: {}", report.peak_concurrency);
    println!("Threads used: {:?}", report.threads_used);
    println!("Elapsed: {:?}", report.elapsed);

    key_points(&[
        "Workers are created once and reused for every task",
        "Extra tasks wait in the queue",
        "shutdown() drains the queue before it returns",
    ]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> DemoConfig {
        DemoConfig::from_toml_str(
            r#"
            [counter]
            workers = 2
            increments = 50

            [account]
            processing_delay_ms = 1

            [buffer]
            items = 4
            producer_pace_ms = 1
            consumer_pace_ms = 2

            [deadlock]
            hold_ms = 20
            deadline_ms = 100

            [pool]
            tasks = 4
            task_duration_ms = 1

            [lifecycle]
            iterations = 2
            pause_ms = 5
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_every_demo_runs_to_completion() {
        let config = fast_config();
        thread_creation(&config).unwrap();
        race_condition(&config).unwrap();
        bank_account(&config).unwrap();
        producer_consumer(&config).unwrap();
        deadlock(&config).unwrap();
        thread_pool(&config).unwrap();
    }

    #[test]
    fn test_expected_balance_past_u64_max() {
        let settings = AccountConfig {
            initial_balance: u64::MAX - 500,
            first_deposit: 400,
            withdrawal: 300,
            second_deposit: 300,
            ..AccountConfig::default()
        };
        assert_eq!(expected_balance(&settings), i128::from(u64::MAX) - 100);
        assert_eq!(expected_balance(&AccountConfig::default()), 1400);
    }

    #[test]
    fn test_bank_account_near_u64_max_does_not_panic() {
        let mut config = fast_config();
        config.account.initial_balance = u64::MAX - 500;
        config.account.first_deposit = 400;
        config.account.withdrawal = 300;
        config.account.second_deposit = 300;
        bank_account(&config).unwrap();
    }
}
