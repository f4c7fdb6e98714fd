//! ChannelRegistry - ChannelId -> Channel のスレッドセーフなマップ
//!
//! # ロック規約
//! - add / get / get_or_err / remove は自分のマップ lock を 1 回だけ取る
//! - relocate だけが 2 つのレジストリにまたがる。方式は `RelocationStrategy` で選ぶ
//! - Coordinated では「共有 lock → 自分のマップ lock」の順でしか取らない

pub mod probe;
pub mod strategy;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, TryLockError};

use tracing::{debug, info};

use crate::domain::{Channel, ChannelId, RegistryId, SwitchyardError};
use crate::observability::RegistrySnapshot;
use crate::scheduler::Scheduler;
use crate::sync::lock;

pub use self::probe::{ProbeReport, RelocationProbe};
pub use self::strategy::{RelocationLock, RelocationStrategy};

/// Thread-safe store of channels, keyed by id.
pub struct ChannelRegistry {
    id: RegistryId,
    strategy: RelocationStrategy,
    channels: Mutex<HashMap<ChannelId, Channel>>,
}

impl ChannelRegistry {
    pub fn new(strategy: RelocationStrategy) -> Self {
        Self {
            id: RegistryId::new(),
            strategy,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Registry that relocates under the process-wide lock.
    pub fn coordinated() -> Self {
        Self::new(RelocationStrategy::coordinated())
    }

    /// Registry whose `relocate` can deadlock. Test fixture only.
    pub fn naive() -> Self {
        Self::new(RelocationStrategy::Naive)
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn strategy(&self) -> &RelocationStrategy {
        &self.strategy
    }

    /// Insert or overwrite by id. Returns the channel previously stored under that id.
    pub fn add(&self, channel: Channel) -> Option<Channel> {
        self.lock_channels().insert(channel.id(), channel)
    }

    pub fn get(&self, id: ChannelId) -> Option<Channel> {
        self.lock_channels().get(&id).cloned()
    }

    pub fn get_or_err(&self, id: ChannelId) -> Result<Channel, SwitchyardError> {
        self.get(id).ok_or(SwitchyardError::ChannelNotFound(id))
    }

    pub fn remove(&self, id: ChannelId) -> Option<Channel> {
        self.lock_channels().remove(&id)
    }

    pub fn remove_channel(&self, channel: &Channel) -> Option<Channel> {
        self.remove(channel.id())
    }

    /// Return the channel for `id`, creating it with `make` if absent.
    ///
    /// Lookup and insert share one critical section, so concurrent callers
    /// with the same new id all see the first writer's channel. The flag is
    /// true for the caller that created it.
    pub fn get_or_insert_with(
        &self,
        id: ChannelId,
        make: impl FnOnce() -> Scheduler,
    ) -> (Channel, bool) {
        let mut channels = self.lock_channels();
        if let Some(existing) = channels.get(&id) {
            return (existing.clone(), false);
        }
        let channel = Channel::new(id, make());
        channels.insert(id, channel.clone());
        debug!(registry = %self.id, channel = %id, "channel created");
        (channel, true)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.lock_channels().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock_channels().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_channels().is_empty()
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<ChannelId> {
        sorted_ids(&self.lock_channels())
    }

    /// Like [`Self::ids`], but `None` instead of blocking when the map is locked.
    pub fn try_ids(&self) -> Option<Vec<ChannelId>> {
        match self.channels.try_lock() {
            Ok(channels) => Some(sorted_ids(&channels)),
            Err(TryLockError::Poisoned(poisoned)) => Some(sorted_ids(&poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            registry: self.id,
            strategy: self.strategy.label().to_string(),
            channels: self.ids(),
        }
    }

    /// Log every registered channel under `tag`.
    pub fn log_channels(&self, tag: &str) {
        for id in self.ids() {
            info!(registry = %self.id, tag, channel = %id, "registered channel");
        }
    }

    /// Move channel `id` from this registry into `destination`.
    ///
    /// Fails with `ChannelNotFound` when `id` is not registered here.
    /// Relocating into the same registry leaves it in place.
    pub fn relocate(
        &self,
        destination: &ChannelRegistry,
        id: ChannelId,
    ) -> Result<(), SwitchyardError> {
        if std::ptr::eq(self, destination) {
            // std の Mutex は再入できないので、同一レジストリへの移動は存在確認だけ
            return if self.contains(id) {
                Ok(())
            } else {
                Err(SwitchyardError::ChannelNotFound(id))
            };
        }

        match &self.strategy {
            RelocationStrategy::Naive => self.relocate_holding_source(destination, id)?,
            RelocationStrategy::Coordinated(scope) => {
                self.relocate_coordinated(scope, destination, id)?
            }
        }

        debug!(
            source = %self.id,
            destination = %destination.id,
            channel = %id,
            strategy = self.strategy.label(),
            "channel relocated"
        );
        Ok(())
    }

    fn relocate_holding_source(
        &self,
        destination: &ChannelRegistry,
        id: ChannelId,
    ) -> Result<(), SwitchyardError> {
        let mut channels = self.lock_channels();
        let Some(channel) = channels.remove(&id) else {
            drop(channels);
            return Err(SwitchyardError::ChannelNotFound(id));
        };
        // 移動元の lock を握ったまま移動先の lock を取る: 対称な relocate と循環待ちになる
        destination.add(channel);
        drop(channels);
        Ok(())
    }

    fn relocate_coordinated(
        &self,
        scope: &RelocationLock,
        destination: &ChannelRegistry,
        id: ChannelId,
    ) -> Result<(), SwitchyardError> {
        let removed = {
            let _scope = scope.acquire();
            self.lock_channels().remove(&id)
        };
        let channel = removed.ok_or(SwitchyardError::ChannelNotFound(id))?;
        destination.add(channel);
        Ok(())
    }

    fn lock_channels(&self) -> MutexGuard<'_, HashMap<ChannelId, Channel>> {
        lock(&self.channels)
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::coordinated()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("id", &self.id)
            .field("strategy", &self.strategy.label())
            .field("channels", &self.try_ids())
            .finish()
    }
}

fn sorted_ids(channels: &HashMap<ChannelId, Channel>) -> Vec<ChannelId> {
    let mut ids: Vec<ChannelId> = channels.keys().copied().collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::PoolConfig;
    use rand::Rng;
    use rstest::rstest;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    fn channel(id: u8) -> Channel {
        Channel::with_config(ChannelId::new(id), PoolConfig::default())
    }

    fn ids(raw: &[u8]) -> Vec<ChannelId> {
        raw.iter().copied().map(ChannelId::new).collect()
    }

    #[rstest]
    #[case::naive(RelocationStrategy::Naive)]
    #[case::coordinated(RelocationStrategy::Coordinated(RelocationLock::new()))]
    fn add_get_remove(#[case] strategy: RelocationStrategy) {
        let registry = ChannelRegistry::new(strategy);
        assert!(registry.is_empty());

        let ch = channel(4);
        assert!(registry.add(ch.clone()).is_none());
        assert!(registry.get(ChannelId::new(4)).unwrap().same_lane(&ch));
        assert_eq!(registry.len(), 1);

        let removed = registry.remove_channel(&ch).unwrap();
        assert!(removed.same_lane(&ch));
        assert!(registry.remove(ChannelId::new(4)).is_none());
        assert!(registry.is_empty());
    }

    #[rstest]
    #[case::naive(RelocationStrategy::Naive)]
    #[case::coordinated(RelocationStrategy::Coordinated(RelocationLock::new()))]
    fn missing_ids_are_not_found(#[case] strategy: RelocationStrategy) {
        let registry = ChannelRegistry::new(strategy);
        registry.add(channel(1));
        for raw in [0u8, 2, 200, 255] {
            let id = ChannelId::new(raw);
            assert!(registry.get(id).is_none());
            assert!(matches!(
                registry.get_or_err(id),
                Err(SwitchyardError::ChannelNotFound(missing)) if missing == id
            ));
        }
    }

    #[test]
    fn add_overwrites_by_id() {
        let registry = ChannelRegistry::coordinated();
        let first = channel(3);
        let second = channel(3);
        registry.add(first.clone());
        let previous = registry.add(second.clone()).unwrap();
        assert!(previous.same_lane(&first));
        assert!(registry.get(ChannelId::new(3)).unwrap().same_lane(&second));
        assert_eq!(registry.ids(), ids(&[3]));
    }

    #[rstest]
    #[case::naive(RelocationStrategy::Naive)]
    #[case::coordinated(RelocationStrategy::Coordinated(RelocationLock::new()))]
    fn relocate_moves_the_same_channel(#[case] strategy: RelocationStrategy) {
        let source = ChannelRegistry::new(strategy.clone());
        let destination = ChannelRegistry::new(strategy);
        let ch = channel(2);
        source.add(ch.clone());

        source.relocate(&destination, ChannelId::new(2)).unwrap();

        assert!(!source.contains(ChannelId::new(2)));
        assert!(destination.get(ChannelId::new(2)).unwrap().same_lane(&ch));
    }

    #[rstest]
    #[case::naive(RelocationStrategy::Naive)]
    #[case::coordinated(RelocationStrategy::Coordinated(RelocationLock::new()))]
    fn relocate_missing_channel_fails(#[case] strategy: RelocationStrategy) {
        let source = ChannelRegistry::new(strategy.clone());
        let destination = ChannelRegistry::new(strategy);
        destination.add(channel(8));

        let err = source.relocate(&destination, ChannelId::new(2)).unwrap_err();
        assert!(matches!(err, SwitchyardError::ChannelNotFound(id) if id == ChannelId::new(2)));
        assert_eq!(destination.ids(), ids(&[8]));
    }

    #[rstest]
    #[case::naive(RelocationStrategy::Naive)]
    #[case::coordinated(RelocationStrategy::Coordinated(RelocationLock::new()))]
    fn relocate_into_itself_keeps_the_channel(#[case] strategy: RelocationStrategy) {
        let registry = ChannelRegistry::new(strategy);
        registry.add(channel(6));
        registry.relocate(&registry, ChannelId::new(6)).unwrap();
        assert_eq!(registry.ids(), ids(&[6]));
        assert!(registry.relocate(&registry, ChannelId::new(7)).is_err());
    }

    #[test]
    fn coordinated_relocation_enters_the_shared_scope() {
        let scope = RelocationLock::named("pair");
        let x = ChannelRegistry::new(RelocationStrategy::Coordinated(scope.clone()));
        let y = ChannelRegistry::new(RelocationStrategy::Coordinated(scope.clone()));
        x.add(channel(1));
        x.relocate(&y, ChannelId::new(1)).unwrap();
        y.relocate(&x, ChannelId::new(1)).unwrap();
        assert_eq!(scope.acquisitions(), 2);
        assert!(!scope.is_held());
    }

    #[test]
    fn naive_relocation_holds_source_lock_while_waiting_for_destination() {
        let source = Arc::new(ChannelRegistry::naive());
        let destination = Arc::new(ChannelRegistry::naive());
        source.add(channel(2));
        source.add(channel(3));

        // 移動先を塞いでおく
        let held = lock(&destination.channels);
        let relocation = {
            let (source, destination) = (Arc::clone(&source), Arc::clone(&destination));
            thread::spawn(move || source.relocate(&destination, ChannelId::new(2)))
        };
        thread::sleep(Duration::from_millis(100));

        let (tx, rx) = mpsc::channel();
        let reader = {
            let source = Arc::clone(&source);
            thread::spawn(move || tx.send(source.contains(ChannelId::new(3))).unwrap())
        };
        assert!(
            rx.recv_timeout(Duration::from_millis(200)).is_err(),
            "source registry should stay locked while the destination is busy"
        );

        drop(held);
        relocation.join().unwrap().unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        reader.join().unwrap();
        assert_eq!(destination.ids(), ids(&[2]));
    }

    #[test]
    fn coordinated_relocation_releases_source_before_destination_add() {
        let scope = RelocationLock::new();
        let source = Arc::new(ChannelRegistry::new(RelocationStrategy::Coordinated(scope.clone())));
        let destination =
            Arc::new(ChannelRegistry::new(RelocationStrategy::Coordinated(scope.clone())));
        source.add(channel(2));
        source.add(channel(3));

        let held = lock(&destination.channels);
        let relocation = {
            let (source, destination) = (Arc::clone(&source), Arc::clone(&destination));
            thread::spawn(move || source.relocate(&destination, ChannelId::new(2)))
        };
        thread::sleep(Duration::from_millis(100));

        let (tx, rx) = mpsc::channel();
        {
            let source = Arc::clone(&source);
            thread::spawn(move || tx.send(source.ids()).unwrap());
        }
        // 取り除いた直後で、移動先への add はまだ終わっていない
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), ids(&[3]));
        assert!(!scope.is_held());

        drop(held);
        relocation.join().unwrap().unwrap();
        assert_eq!(destination.ids(), ids(&[2]));
    }

    #[test]
    fn concurrent_get_or_insert_has_one_winner() {
        let registry = Arc::new(ChannelRegistry::coordinated());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get_or_insert_with(ChannelId::new(9), Scheduler::new)
                })
            })
            .collect();
        let results: Vec<(Channel, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        let stored = registry.get(ChannelId::new(9)).unwrap();
        assert!(results.iter().all(|(ch, _)| ch.same_lane(&stored)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_add_remove_keeps_the_map_consistent() {
        let registry = Arc::new(ChannelRegistry::coordinated());
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut mine = HashSet::new();
                    for _ in 0..500 {
                        let id = ChannelId::new(t * 16 + rng.gen_range(0..16u8));
                        if rng.gen_range(0..2) == 0 {
                            registry.add(channel(id.get()));
                            mine.insert(id);
                        } else {
                            registry.remove(id);
                            mine.remove(&id);
                        }
                    }
                    mine
                })
            })
            .collect();

        let mut expected: Vec<ChannelId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        expected.sort();
        assert_eq!(registry.ids(), expected);
    }

    #[test]
    fn snapshot_reports_strategy_and_ids() {
        let registry = ChannelRegistry::naive();
        registry.add(channel(5));
        registry.add(channel(2));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.registry, registry.id());
        assert_eq!(snapshot.strategy, "naive");
        assert_eq!(snapshot.channels, ids(&[2, 5]));
        assert_eq!(registry.try_ids(), Some(ids(&[2, 5])));
    }
}
