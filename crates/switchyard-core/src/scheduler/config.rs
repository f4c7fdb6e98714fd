use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::SwitchyardError;

/// Sizing of a scheduler's worker pool.
///
/// Defaults: 2 core workers, at most 4, idle extra workers retire after 30s,
/// and at most 4 submissions wait for a free worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub core_workers: usize,
    pub max_workers: usize,
    pub keep_alive_ms: u64,
    pub queue_capacity: usize,
    /// Worker threads are named `<thread_name>-<n>`.
    pub thread_name: String,
}

impl PoolConfig {
    pub fn with_workers(mut self, core: usize, max: usize) -> Self {
        self.core_workers = core;
        self.max_workers = max;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn validate(&self) -> Result<(), SwitchyardError> {
        if self.max_workers == 0 {
            return Err(SwitchyardError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.core_workers > self.max_workers {
            return Err(SwitchyardError::InvalidConfig(format!(
                "core_workers ({}) exceeds max_workers ({})",
                self.core_workers, self.max_workers
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: 2,
            max_workers: 4,
            keep_alive_ms: 30_000,
            queue_capacity: 4,
            thread_name: "switchyard-worker".to_string(),
        }
    }
}
