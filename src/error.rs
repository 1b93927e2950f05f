use std::io;
use thiserror::Error;

/// Every failure a demo can hit. Expected domain outcomes such as an
/// insufficient balance or a suspected deadlock are reported as values and
/// never show up here.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("depositing {amount} would overflow balance {balance}")]
    BalanceOverflow { balance: u64, amount: u64 },

    #[error("queue capacity must be at least 1")]
    InvalidCapacity,

    #[error("worker pool needs at least one worker, got {0}")]
    InvalidPoolSize(usize),

    #[error("worker pool is shut down and no longer accepts tasks")]
    PoolShutDown,

    #[error("blocking wait was interrupted")]
    Interrupted,

    #[error("task finished without producing a result")]
    TaskLost,

    #[error("thread '{name}' panicked")]
    WorkerPanicked { name: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<toml::de::Error> for UnitError {
    fn from(err: toml::de::Error) -> Self {
        UnitError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UnitError>;
