//! Domain model (ids, channel, errors).

pub mod channel;
pub mod errors;
pub mod ids;

pub use self::channel::Channel;
pub use self::errors::{SwitchyardError, UseCaseError};
pub use self::ids::{ChannelId, RegistryId};
