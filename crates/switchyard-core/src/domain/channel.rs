//! Channel - ID と Scheduler の不変なペア

use std::fmt;
use std::sync::Arc;

use super::ids::ChannelId;
use crate::scheduler::{PoolConfig, Scheduler};

/// One execution lane: an id bound to the scheduler that runs its use cases.
///
/// Cloning is cheap and every clone refers to the same scheduler. A channel
/// lives in at most one registry at a time; `ChannelRegistry::relocate`
/// transfers it.
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    scheduler: Arc<Scheduler>,
}

impl Channel {
    pub fn new(id: ChannelId, scheduler: Scheduler) -> Self {
        Self {
            id,
            scheduler: Arc::new(scheduler),
        }
    }

    /// Channel backed by a fresh, not yet started scheduler.
    pub fn with_config(id: ChannelId, config: PoolConfig) -> Self {
        Self::new(id, Scheduler::with_config(config))
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Whether both handles refer to the same scheduler.
    pub fn same_lane(&self, other: &Channel) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.scheduler, &other.scheduler)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel ({})", self.id)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("scheduler", &self.scheduler.state())
            .finish()
    }
}
