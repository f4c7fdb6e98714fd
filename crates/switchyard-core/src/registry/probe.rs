//! RelocationProbe - 対称な relocate を 2 スレッドで同時に走らせる
//!
//! left / right の 2 レジストリに 1 チャネルずつ置き、
//! - スレッド A: left_channel を left → right → left ... と往復させる
//! - スレッド B: right_channel を right → left → right ... と往復させる
//!
//! 各ラウンドの移動方向が逆向きになるので、Naive では循環待ちが起こりうる。
//! 期限内に両スレッドが終わらなければハングとして報告し、スレッドは放置する。

use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Channel, ChannelId, SwitchyardError};
use crate::scheduler::Scheduler;

use super::ChannelRegistry;
use super::strategy::RelocationStrategy;

/// Outcome of one probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub strategy: String,
    pub rounds: u32,
    /// false when the movers did not finish before the timeout.
    pub completed: bool,
    pub elapsed_ms: u64,
    /// Channel ids left in each registry; `None` if the registry was still locked.
    pub left: Option<Vec<ChannelId>>,
    pub right: Option<Vec<ChannelId>>,
}

#[derive(Debug, Clone)]
pub struct RelocationProbe {
    strategy: RelocationStrategy,
    rounds: u32,
    left_channel: ChannelId,
    right_channel: ChannelId,
}

impl RelocationProbe {
    pub fn new(strategy: RelocationStrategy, rounds: u32) -> Self {
        Self {
            strategy,
            rounds,
            left_channel: ChannelId::new(2),
            right_channel: ChannelId::new(5),
        }
    }

    pub fn with_channels(mut self, left: ChannelId, right: ChannelId) -> Self {
        self.left_channel = left;
        self.right_channel = right;
        self
    }

    pub fn run(&self, timeout: Duration) -> Result<ProbeReport, SwitchyardError> {
        if self.left_channel == self.right_channel {
            return Err(SwitchyardError::InvalidConfig(format!(
                "probe channels must differ, both are {}",
                self.left_channel
            )));
        }

        let left = Arc::new(ChannelRegistry::new(self.strategy.clone()));
        let right = Arc::new(ChannelRegistry::new(self.strategy.clone()));
        left.add(Channel::new(self.left_channel, Scheduler::new()));
        right.add(Channel::new(self.right_channel, Scheduler::new()));

        let barrier = Arc::new(Barrier::new(2));
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();

        let movers = [
            ("probe-left", &left, &right, self.left_channel),
            ("probe-right", &right, &left, self.right_channel),
        ];
        for (name, home, away, id) in movers {
            let mover = Mover {
                home: Arc::clone(home),
                away: Arc::clone(away),
                id,
                rounds: self.rounds,
            };
            let barrier = Arc::clone(&barrier);
            let tx = tx.clone();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || {
                    barrier.wait();
                    let _ = tx.send(mover.run());
                })
                .map_err(SwitchyardError::WorkerSpawn)?;
        }
        drop(tx);

        let deadline = started + timeout;
        let mut finished = 0;
        while finished < 2 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(Ok(())) => finished += 1,
                Ok(Err(error)) => return Err(error),
                Err(_) => break,
            }
        }

        let completed = finished == 2;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let strategy = self.strategy.label();
        if completed {
            info!(strategy, rounds = self.rounds, elapsed_ms, "relocation probe finished");
        } else {
            warn!(
                strategy,
                rounds = self.rounds,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "relocation probe did not finish, movers look deadlocked"
            );
        }

        Ok(ProbeReport {
            strategy: strategy.to_string(),
            rounds: self.rounds,
            completed,
            elapsed_ms,
            left: left.try_ids(),
            right: right.try_ids(),
        })
    }
}

struct Mover {
    home: Arc<ChannelRegistry>,
    away: Arc<ChannelRegistry>,
    id: ChannelId,
    rounds: u32,
}

impl Mover {
    fn run(&self) -> Result<(), SwitchyardError> {
        for round in 0..self.rounds {
            if round % 2 == 0 {
                self.home.relocate(&self.away, self.id)?;
            } else {
                self.away.relocate(&self.home, self.id)?;
            }
        }
        Ok(())
    }
}
