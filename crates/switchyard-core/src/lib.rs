//! switchyard-core
//!
//! Background execution lanes for presenters: use cases run on per-channel
//! worker pools and report back only while their owner is still attached.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, channel, errors）
//! - **usecase**: UseCase trait, Callback, Completion, FindById
//! - **scheduler**: 有界ワーカープール（core 2 / max 4 / queue 4）と Submission
//! - **registry**: ChannelRegistry, RelocationStrategy, RelocationProbe
//! - **presenter**: SchedulerFacade（detach 後の配送抑止）
//! - **ports**: 抽象化レイヤー（Repository, View）
//! - **observability**: シリアライズ可能な状態ビュー

pub mod domain;
pub mod observability;
pub mod ports;
pub mod presenter;
pub mod registry;
pub mod scheduler;
pub mod usecase;

mod sync;

pub use domain::{Channel, ChannelId, RegistryId, SwitchyardError, UseCaseError};
pub use presenter::{FacadeBuilder, SchedulerFacade};
pub use registry::{ChannelRegistry, RelocationLock, RelocationStrategy};
pub use scheduler::{PoolConfig, Scheduler};
pub use usecase::{Callback, Completion, UseCase};
