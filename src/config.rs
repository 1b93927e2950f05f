//! Demo parameters.
//!
//! Every field has a default matching the numbers the lectures use, so an
//! empty TOML document (or no file at all) reproduces the classroom run.
//! Durations are plain millisecond counts to keep the file readable:
//!
//! ```toml
//! [counter]
//! workers = 4
//! increments = 50000
//!
//! [deadlock]
//! deadline_ms = 250
//! ```

use crate::error::{Result, UnitError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    pub counter: CounterConfig,
    pub account: AccountConfig,
    pub buffer: BufferConfig,
    pub deadlock: DeadlockConfig,
    pub pool: PoolConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CounterConfig {
    pub workers: usize,
    pub increments: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self { workers: 10, increments: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountConfig {
    pub holder: String,
    pub initial_balance: u64,
    pub first_deposit: u64,
    pub withdrawal: u64,
    pub second_deposit: u64,
    pub processing_delay_ms: u64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            holder: "Alice".to_string(),
            initial_balance: 1000,
            first_deposit: 500,
            withdrawal: 300,
            second_deposit: 200,
            processing_delay_ms: 100,
        }
    }
}

impl AccountConfig {
    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    pub items: u32,
    pub producer_pace_ms: u64,
    pub consumer_pace_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            items: 10,
            producer_pace_ms: 100,
            consumer_pace_ms: 200,
        }
    }
}

impl BufferConfig {
    pub fn producer_pace(&self) -> Duration {
        Duration::from_millis(self.producer_pace_ms)
    }

    pub fn consumer_pace(&self) -> Duration {
        Duration::from_millis(self.consumer_pace_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeadlockConfig {
    pub hold_ms: u64,
    pub deadline_ms: u64,
    pub ordered_workers: usize,
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            hold_ms: 100,
            deadline_ms: 500,
            ordered_workers: 2,
        }
    }
}

impl DeadlockConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    pub tasks: usize,
    pub task_duration_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            tasks: 10,
            task_duration_ms: 200,
        }
    }
}

impl PoolConfig {
    pub fn task_duration(&self) -> Duration {
        Duration::from_millis(self.task_duration_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    pub iterations: u32,
    pub pause_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { iterations: 5, pause_ms: 300 }
    }
}

impl LifecycleConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl DemoConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DemoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values the demos cannot run with. Zero iteration counts are
    /// allowed; they just make a demo trivial.
    pub fn validate(&self) -> Result<()> {
        if self.buffer.capacity == 0 {
            return Err(UnitError::InvalidCapacity);
        }
        if self.pool.workers == 0 {
            return Err(UnitError::InvalidPoolSize(0));
        }
        if self.deadlock.ordered_workers < 2 {
            return Err(UnitError::Config(
                "deadlock.ordered_workers must be at least 2".to_string(),
            ));
        }
        if self.deadlock.deadline_ms == 0 {
            return Err(UnitError::Config(
                "deadlock.deadline_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_document_gives_classroom_defaults() {
        let config = DemoConfig::from_toml_str("").unwrap();
        assert_eq!(config, DemoConfig::default());
        assert_eq!(config.counter.workers, 10);
        assert_eq!(config.counter.increments, 1000);
        assert_eq!(config.account.initial_balance, 1000);
        assert_eq!(config.buffer.capacity, 5);
        assert_eq!(config.pool.workers, 3);
        assert_eq!(config.deadlock.deadline(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = DemoConfig::from_toml_str(
            r#"
            [counter]
            increments = 5000

            [buffer]
            consumer_pace_ms = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.counter.workers, 10);
        assert_eq!(config.counter.increments, 5000);
        assert_eq!(config.buffer.consumer_pace(), Duration::from_millis(10));
        assert_eq!(config.buffer.producer_pace(), Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = DemoConfig::from_toml_str("[buffer]\ncapacity = 0").unwrap_err();
        assert!(matches!(err, UnitError::InvalidCapacity));

        let err = DemoConfig::from_toml_str("[pool]\nworkers = 0").unwrap_err();
        assert!(matches!(err, UnitError::InvalidPoolSize(0)));

        let err = DemoConfig::from_toml_str("[deadlock]\nordered_workers = 1").unwrap_err();
        assert!(matches!(err, UnitError::Config(_)));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = DemoConfig::from_toml_str("[counter\nworkers = 3").unwrap_err();
        assert!(matches!(err, UnitError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[pool]\nworkers = 2\ntasks = 4").unwrap();

        let config = DemoConfig::load(file.path()).unwrap();
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.pool.tasks, 4);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = DemoConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, UnitError::Io(_)));
    }
}
