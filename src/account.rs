//! A bank account whose deposit and withdraw hold the account lock for the
//! whole operation, including a simulated processing delay. Concurrent
//! callers therefore queue up behind each other.

use crate::error::{Result, UnitError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawResult {
    Completed { balance: u64 },
    InsufficientBalance { balance: u64, requested: u64 },
}

impl WithdrawResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, WithdrawResult::Completed { .. })
    }
}

#[derive(Debug)]
pub struct Account {
    holder: String,
    balance: Mutex<u64>,
    processing_delay: Duration,
}

impl Account {
    pub fn new(holder: impl Into<String>, initial_balance: u64, processing_delay: Duration) -> Self {
        Self {
            holder: holder.into(),
            balance: Mutex::new(initial_balance),
            processing_delay,
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn deposit(&self, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(UnitError::InvalidAmount);
        }

        let mut balance = self.balance.lock();
        info!(holder = %self.holder, amount, "depositing");
        let new_balance = balance.checked_add(amount).ok_or(UnitError::BalanceOverflow {
            balance: *balance,
            amount,
        })?;
        thread::sleep(self.processing_delay);
        *balance = new_balance;
        info!(holder = %self.holder, balance = new_balance, "deposit complete");
        Ok(new_balance)
    }

    /// Insufficient funds is an ordinary outcome: the balance is left alone
    /// and the caller gets `InsufficientBalance` back.
    pub fn withdraw(&self, amount: u64) -> Result<WithdrawResult> {
        if amount == 0 {
            return Err(UnitError::InvalidAmount);
        }

        let mut balance = self.balance.lock();
        info!(holder = %self.holder, amount, "withdrawing");

        if *balance < amount {
            warn!(
                holder = %self.holder,
                balance = *balance,
                requested = amount,
                "withdrawal failed, insufficient balance"
            );
            return Ok(WithdrawResult::InsufficientBalance {
                balance: *balance,
                requested: amount,
            });
        }

        let new_balance = *balance - amount;
        thread::sleep(self.processing_delay);
        *balance = new_balance;
        info!(holder = %self.holder, balance = new_balance, "withdrawal complete");
        Ok(WithdrawResult::Completed { balance: new_balance })
    }

    pub fn balance(&self) -> u64 {
        *self.balance.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    Deposit(u64),
    Withdraw(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub initial_balance: u64,
    pub final_balance: u64,
    pub rejected: Vec<(String, Transaction)>,
}

/// Run every transaction on its own thread (`Thread-1`, `Thread-2`, ...) and
/// wait for all of them.
pub fn run_transfers(account: Arc<Account>, transactions: &[Transaction]) -> Result<TransferReport> {
    let initial_balance = account.balance();

    let mut handles = Vec::with_capacity(transactions.len());
    for (index, &transaction) in transactions.iter().enumerate() {
        let name = format!("Thread-{}", index + 1);
        let account = Arc::clone(&account);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let accepted = match transaction {
                Transaction::Deposit(amount) => account.deposit(amount).map(|_| true),
                Transaction::Withdraw(amount) => {
                    account.withdraw(amount).map(|result| result.is_completed())
                }
            };
            (transaction, accepted)
        })?;
        handles.push((name, handle));
    }

    let mut rejected = Vec::new();
    for (name, handle) in handles {
        let (transaction, accepted) = handle
            .join()
            .map_err(|_| UnitError::WorkerPanicked { name: name.clone() })?;
        match accepted {
            Ok(true) => {}
            Ok(false) => rejected.push((name, transaction)),
            Err(err) => {
                warn!(thread = %name, error = %err, "transaction refused");
                rejected.push((name, transaction));
            }
        }
    }

    Ok(TransferReport {
        initial_balance,
        final_balance: account.balance(),
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_account(balance: u64) -> Account {
        Account::new("Alice", balance, Duration::from_millis(5))
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let account = quick_account(100);
        assert_eq!(account.deposit(50).unwrap(), 150);
        assert_eq!(
            account.withdraw(120).unwrap(),
            WithdrawResult::Completed { balance: 30 }
        );
        assert_eq!(account.balance(), 30);
    }

    #[test]
    fn test_insufficient_balance_leaves_balance_unchanged() {
        let account = quick_account(100);
        let result = account.withdraw(101).unwrap();

        assert_eq!(
            result,
            WithdrawResult::InsufficientBalance { balance: 100, requested: 101 }
        );
        assert!(!result.is_completed());
        assert_eq!(account.balance(), 100);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let account = quick_account(100);
        assert!(matches!(account.deposit(0), Err(UnitError::InvalidAmount)));
        assert!(matches!(account.withdraw(0), Err(UnitError::InvalidAmount)));
        assert_eq!(account.balance(), 100);
    }

    #[test]
    fn test_deposit_overflow_is_rejected() {
        let account = quick_account(u64::MAX);
        assert!(matches!(
            account.deposit(1),
            Err(UnitError::BalanceOverflow { balance: u64::MAX, amount: 1 })
        ));
        assert_eq!(account.balance(), u64::MAX);
    }

    #[test]
    fn test_overflowing_deposit_reported_by_transfers() {
        let account = Arc::new(quick_account(u64::MAX - 10));
        let report = run_transfers(
            Arc::clone(&account),
            &[Transaction::Deposit(500), Transaction::Withdraw(5)],
        )
        .unwrap();

        assert_eq!(report.final_balance, u64::MAX - 15);
        assert_eq!(
            report.rejected,
            vec![("Thread-1".to_string(), Transaction::Deposit(500))]
        );
    }

    #[test]
    fn test_concurrent_transfers_final_balance() {
        for _ in 0..3 {
            let account = Arc::new(quick_account(1000));
            let report = run_transfers(
                account,
                &[
                    Transaction::Deposit(500),
                    Transaction::Withdraw(300),
                    Transaction::Deposit(200),
                ],
            )
            .unwrap();

            assert_eq!(report.initial_balance, 1000);
            assert_eq!(report.final_balance, 1400);
            assert!(report.rejected.is_empty());
        }
    }

    #[test]
    fn test_operations_serialize_behind_the_lock() {
        let account = Arc::new(Account::new("Bob", 0, Duration::from_millis(40)));
        let start = std::time::Instant::now();

        run_transfers(
            Arc::clone(&account),
            &[Transaction::Deposit(1), Transaction::Deposit(1), Transaction::Deposit(1)],
        )
        .unwrap();

        // Three 40ms critical sections cannot overlap.
        assert!(start.elapsed() >= Duration::from_millis(120));
        assert_eq!(account.balance(), 3);
    }

    #[test]
    fn test_overdraft_reported_not_escalated() {
        let account = Arc::new(quick_account(10));
        let report = run_transfers(account, &[Transaction::Withdraw(50)]).unwrap();

        assert_eq!(report.final_balance, 10);
        assert_eq!(
            report.rejected,
            vec![("Thread-1".to_string(), Transaction::Withdraw(50))]
        );
    }
}
