//! RelocationStrategy - relocate のロック方式
//!
//! - **Naive**: 移動元の lock を握ったまま移動先の lock を取る。対称な relocate が同時に走ると
//!   循環待ちでデッドロックする。比較・回帰テスト用に意図的に残している。
//! - **Coordinated**: 全レジストリ共通の `RelocationLock` の下で移動元から取り除くだけにし、
//!   lock を手放してから移動先へ add する。2 つのマップ lock を同時に握らないので循環待ちは起きない。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, TryLockError};

use crate::sync::lock;

struct LockInner {
    name: String,
    mutex: Mutex<()>,
    acquisitions: AtomicU64,
}

/// Lock scope shared by every registry that relocates through it.
///
/// Clones share the scope. [`RelocationLock::global`] is the process-wide
/// instance used by default; [`RelocationLock::new`] builds an isolated one.
#[derive(Clone)]
pub struct RelocationLock {
    inner: Arc<LockInner>,
}

impl RelocationLock {
    pub fn global() -> Self {
        static GLOBAL: OnceLock<RelocationLock> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::named("global")).clone()
    }

    pub fn new() -> Self {
        Self::named("isolated")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(LockInner {
                name: name.into(),
                mutex: Mutex::new(()),
                acquisitions: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn shares_scope_with(&self, other: &RelocationLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// How many relocations have entered this scope.
    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::Relaxed)
    }

    pub fn is_held(&self) -> bool {
        matches!(self.inner.mutex.try_lock(), Err(TryLockError::WouldBlock))
    }

    pub(crate) fn acquire(&self) -> MutexGuard<'_, ()> {
        let guard = lock(&self.inner.mutex);
        self.inner.acquisitions.fetch_add(1, Ordering::Relaxed);
        guard
    }
}

impl Default for RelocationLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RelocationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelocationLock")
            .field("name", &self.inner.name)
            .field("acquisitions", &self.acquisitions())
            .finish()
    }
}

/// How a registry coordinates `relocate` with the destination registry.
#[derive(Debug, Clone)]
pub enum RelocationStrategy {
    /// Holds the source lock while adding to the destination. Deadlocks under
    /// concurrent symmetric relocation; keep it out of production code.
    Naive,
    /// Removes under a shared lock scope, adds after releasing it.
    Coordinated(RelocationLock),
}

impl RelocationStrategy {
    /// Coordinated strategy on the process-wide lock.
    pub fn coordinated() -> Self {
        Self::Coordinated(RelocationLock::global())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Coordinated(_) => "coordinated",
        }
    }

    pub fn is_deadlock_free(&self) -> bool {
        matches!(self, Self::Coordinated(_))
    }
}

impl Default for RelocationStrategy {
    fn default() -> Self {
        Self::coordinated()
    }
}
