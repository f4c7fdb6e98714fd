//! Scheduler - UseCase をスレッドプールで非同期実行する
//!
//! # ライフサイクル
//! ```text
//! Uninitialized --execute--> Running --stop_execution--> Stopped --execute--> Running
//! ```
//! プールは最初の `execute` で遅延生成され、`stop_execution` で捨てられる。
//! 停止後の `execute` は新しいプールを作る。

pub mod config;
pub mod pool;
pub mod submission;

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::domain::SwitchyardError;
use crate::observability::{PoolStats, SchedulerState};
use crate::sync::lock;
use crate::usecase::{Callback, UseCase};

pub use self::config::PoolConfig;
pub use self::pool::{Rejection, WorkerPool};
pub use self::submission::Submission;

/// `pool` があれば Running。なければ `stopped` で Uninitialized / Stopped を区別する。
#[derive(Default)]
struct Lifecycle {
    pool: Option<WorkerPool>,
    stopped: bool,
}

/// Runs use cases on a lazily built, bounded worker pool.
pub struct Scheduler {
    config: PoolConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// The config is validated when the pool is first built.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            config,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Bind `request` and `callback` to `task` and hand it to the pool.
    ///
    /// Returns as soon as the pool admitted the work. A rejected submission is
    /// dropped silently: the error goes to the caller, not to `callback`.
    pub fn execute<U: UseCase>(
        &self,
        task: Arc<U>,
        request: U::Request,
        callback: impl Callback<U::Response> + 'static,
    ) -> Result<(), SwitchyardError> {
        let submission = Submission::bind(task, request, callback);
        self.resubmit(submission).map_err(|rejection| {
            rejection.submission.discard();
            rejection.error
        })
    }

    /// Admit an already bound submission, e.g. one returned by `stop_execution`.
    pub fn resubmit(&self, submission: Submission) -> Result<(), Rejection> {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.pool.is_none() {
            if let Err(error) = self.config.validate() {
                return Err(Rejection { submission, error });
            }
            debug!(
                core = self.config.core_workers,
                max = self.config.max_workers,
                queue = self.config.queue_capacity,
                "building worker pool"
            );
        }
        let pool = lifecycle
            .pool
            .get_or_insert_with(|| WorkerPool::new(self.config.clone()));
        pool.submit(submission)
    }

    /// Shut the pool down and return the submissions that never started.
    ///
    /// Running use cases are left to finish. The next `execute` builds a new pool.
    pub fn stop_execution(&self) -> Vec<Submission> {
        let mut lifecycle = lock(&self.lifecycle);
        match lifecycle.pool.take() {
            Some(pool) => {
                lifecycle.stopped = true;
                let pending = pool.shutdown_now();
                debug!(pending = pending.len(), "scheduler stopped");
                pending
            }
            None => Vec::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        let lifecycle = lock(&self.lifecycle);
        match (&lifecycle.pool, lifecycle.stopped) {
            (Some(_), _) => SchedulerState::Running,
            (None, false) => SchedulerState::Uninitialized,
            (None, true) => SchedulerState::Stopped,
        }
    }

    /// `None` unless a pool is running.
    pub fn stats(&self) -> Option<PoolStats> {
        lock(&self.lifecycle).pool.as_ref().map(WorkerPool::stats)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
