//! FacadeBuilder - SchedulerFacade の構築
//!
//! # Fail-fast 設計
//! - `build()` 時に PoolConfig を検証し、不正なら最初の schedule を待たずにエラーを返す
//! - registry 未指定なら global lock 上の coordinated registry を使う

use std::marker::PhantomData;
use std::sync::Arc;

use crate::domain::SwitchyardError;
use crate::registry::ChannelRegistry;
use crate::scheduler::PoolConfig;

use super::SchedulerFacade;

/// Builder for [`SchedulerFacade`].
///
/// # 使用例
/// ```ignore
/// let facade: SchedulerFacade<ConsoleView> = SchedulerFacade::builder()
///     .pool_config(PoolConfig::default().with_workers(1, 2))
///     .build()?;
/// ```
pub struct FacadeBuilder<V: ?Sized> {
    registry: Option<Arc<ChannelRegistry>>,
    pool_config: PoolConfig,
    _view: PhantomData<fn() -> Arc<V>>,
}

impl<V: ?Sized + Send + Sync + 'static> FacadeBuilder<V> {
    pub fn new() -> Self {
        Self {
            registry: None,
            pool_config: PoolConfig::default(),
            _view: PhantomData,
        }
    }

    pub fn registry(mut self, registry: Arc<ChannelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Config for every scheduler the facade creates, the default channel included.
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    pub fn build(self) -> Result<SchedulerFacade<V>, SwitchyardError> {
        self.pool_config.validate()?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ChannelRegistry::coordinated()));
        Ok(SchedulerFacade::from_parts(registry, self.pool_config))
    }
}

impl<V: ?Sized + Send + Sync + 'static> Default for FacadeBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}
