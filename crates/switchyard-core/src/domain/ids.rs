//! Domain identifiers.
//!
//! - `ChannelId`: チャンネルの小さなタグ（u8）。0 はデフォルトチャンネル。
//! - `RegistryId`: レジストリごとの ULID。ログと Debug 表示でどのレジストリかを区別する。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Channel tag.
///
/// A `u8` keeps lookup cheap and mirrors the small, fixed set of lanes a
/// single owner normally uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u8);

impl ChannelId {
    /// The lane every facade creates eagerly.
    pub const DEFAULT: ChannelId = ChannelId(0);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl From<u8> for ChannelId {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a `ChannelRegistry` instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryId(Ulid);

impl RegistryId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for RegistryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry-{}", self.0)
    }
}
