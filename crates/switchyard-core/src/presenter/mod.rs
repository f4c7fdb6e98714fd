//! Presenter - view ごとの SchedulerFacade
//!
//! # 責務
//! - ChannelRegistry を 1 つ保持し、デフォルトチャネル（id 0）を常に用意する
//! - `schedule` / `schedule_on` / `schedule_or_create_on` でチャネルの Scheduler に投げる
//! - callback を [`owner::AttachedOnly`] で包み、detach 後の結果配送を抑止する
//!
//! # 使用例
//! ```ignore
//! let facade: SchedulerFacade<ConsoleView> = SchedulerFacade::new();
//! facade.attach(&view);
//! facade.schedule(find_user, UserId(1), facade.render_callback())?;
//! // 画面を閉じる
//! facade.detach();
//! ```

pub mod builder;
pub mod owner;

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::domain::{Channel, ChannelId, SwitchyardError};
use crate::ports::View;
use crate::registry::ChannelRegistry;
use crate::scheduler::{PoolConfig, Scheduler};
use crate::sync::lock;
use crate::usecase::{Callback, UseCase};

pub use self::builder::FacadeBuilder;
pub use self::owner::{Owner, Render};
use self::owner::AttachedOnly;

/// Entry point a presenter uses to run use cases off its own thread.
pub struct SchedulerFacade<V: ?Sized + Send + Sync + 'static> {
    registry: Mutex<Arc<ChannelRegistry>>,
    pool_config: PoolConfig,
    owner: Arc<Owner<V>>,
}

impl<V: ?Sized + Send + Sync + 'static> SchedulerFacade<V> {
    /// Facade over a fresh coordinated registry with default pool settings.
    pub fn new() -> Self {
        Self::from_parts(Arc::new(ChannelRegistry::coordinated()), PoolConfig::default())
    }

    pub fn builder() -> FacadeBuilder<V> {
        FacadeBuilder::new()
    }

    pub(crate) fn from_parts(registry: Arc<ChannelRegistry>, pool_config: PoolConfig) -> Self {
        ensure_default_channel(&registry, &pool_config);
        Self {
            registry: Mutex::new(registry),
            pool_config,
            owner: Arc::new(Owner::new()),
        }
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        Arc::clone(&lock(&self.registry))
    }

    /// Replace the registry. The default channel is created in it if missing.
    pub fn set_registry(&self, registry: Arc<ChannelRegistry>) {
        ensure_default_channel(&registry, &self.pool_config);
        debug!(registry = %registry.id(), "facade registry replaced");
        *lock(&self.registry) = registry;
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    pub fn attach(&self, view: &Arc<V>) {
        self.owner.attach(view);
    }

    /// Outcomes of everything scheduled before this call are dropped.
    pub fn detach(&self) {
        self.owner.detach();
    }

    pub fn view(&self) -> Option<Arc<V>> {
        self.owner.view()
    }

    pub fn is_attached(&self) -> bool {
        self.owner.is_attached()
    }

    pub fn owner(&self) -> &Arc<Owner<V>> {
        &self.owner
    }

    /// Run `task` on the default channel.
    pub fn schedule<U: UseCase>(
        &self,
        task: Arc<U>,
        request: U::Request,
        callback: impl Callback<U::Response> + 'static,
    ) -> Result<(), SwitchyardError> {
        self.schedule_on(ChannelId::DEFAULT, task, request, callback)
    }

    /// Run `task` on channel `id`, which must already be registered.
    pub fn schedule_on<U: UseCase>(
        &self,
        id: ChannelId,
        task: Arc<U>,
        request: U::Request,
        callback: impl Callback<U::Response> + 'static,
    ) -> Result<(), SwitchyardError> {
        let channel = self.registry().get_or_err(id)?;
        self.dispatch(&channel, task, request, callback)
    }

    /// Run `task` on channel `id`, registering a new channel first if needed.
    pub fn schedule_or_create_on<U: UseCase>(
        &self,
        id: ChannelId,
        task: Arc<U>,
        request: U::Request,
        callback: impl Callback<U::Response> + 'static,
    ) -> Result<(), SwitchyardError> {
        let (channel, _) = self
            .registry()
            .get_or_insert_with(id, || Scheduler::with_config(self.pool_config.clone()));
        self.dispatch(&channel, task, request, callback)
    }

    fn dispatch<U: UseCase>(
        &self,
        channel: &Channel,
        task: Arc<U>,
        request: U::Request,
        callback: impl Callback<U::Response> + 'static,
    ) -> Result<(), SwitchyardError> {
        debug!(channel = %channel.id(), task = task.name(), "scheduling use case");
        let guarded = AttachedOnly::new(callback, Arc::clone(&self.owner));
        channel.scheduler().execute(task, request, guarded)
    }
}

impl<V> SchedulerFacade<V>
where
    V: View + ?Sized + Send + Sync + 'static,
{
    /// Callback that shows the outcome on the attached view.
    ///
    /// Success goes to `View::on_result`, failure to `View::on_show_message`
    /// with the error text.
    pub fn render_callback(&self) -> Render<V> {
        Render::new(Arc::clone(&self.owner))
    }
}

impl<V: ?Sized + Send + Sync + 'static> Default for SchedulerFacade<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ?Sized + Send + Sync + 'static> std::fmt::Debug for SchedulerFacade<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerFacade")
            .field("registry", &self.registry())
            .field("owner", &self.owner)
            .finish()
    }
}

fn ensure_default_channel(registry: &ChannelRegistry, config: &PoolConfig) {
    let (_, created) =
        registry.get_or_insert_with(ChannelId::DEFAULT, || Scheduler::with_config(config.clone()));
    if created {
        debug!(registry = %registry.id(), "default channel created");
    }
}
