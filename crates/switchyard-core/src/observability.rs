use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, RegistryId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub workers: usize,
    pub idle: usize,
    pub queued: usize,
    pub completed: u64,
    pub rejected: u64,
}

/// Lifecycle of a scheduler's worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Uninitialized,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub registry: RegistryId,
    pub strategy: String,
    pub channels: Vec<ChannelId>,
}
