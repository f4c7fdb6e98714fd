//! Owner - facade にぶら下がる view の追跡と、結果配送のガード
//!
//! # 配送条件（配送時点で判定）
//! 1. attached フラグが立っている
//! 2. view がまだ生きている（`Weak` が upgrade できる）
//! 3. schedule 時の detach epoch から detach が一度も起きていない
//!
//! 3 により「detach → 再 attach」を挟んだ古い結果も配送されない。
//! 抑止した結果は捨てるだけで、後から再配送はしない。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::domain::UseCaseError;
use crate::ports::View;
use crate::sync::lock;
use crate::usecase::Callback;

/// Attachment state shared between a facade and the callbacks it handed out.
pub struct Owner<V: ?Sized> {
    view: Mutex<Option<Weak<V>>>,
    attached: AtomicBool,
    epoch: AtomicU64,
}

impl<V: ?Sized> Owner<V> {
    pub(crate) fn new() -> Self {
        Self {
            view: Mutex::new(None),
            attached: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn attach(&self, view: &Arc<V>) {
        *lock(&self.view) = Some(Arc::downgrade(view));
        self.attached.store(true, Ordering::SeqCst);
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *lock(&self.view) = None;
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Number of detaches so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> Option<Arc<V>> {
        lock(&self.view).as_ref().and_then(Weak::upgrade)
    }

    /// Whether an outcome scheduled at `ticket` may still be delivered.
    pub fn accepts(&self, ticket: u64) -> bool {
        self.is_attached() && self.epoch() == ticket && self.view().is_some()
    }
}

impl<V: ?Sized> std::fmt::Debug for Owner<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("attached", &self.is_attached())
            .field("epoch", &self.epoch())
            .finish()
    }
}

/// Forwards to `inner` only while the owner still accepts the ticket.
pub(crate) struct AttachedOnly<C, V: ?Sized> {
    inner: C,
    owner: Arc<Owner<V>>,
    ticket: u64,
}

impl<C, V: ?Sized> AttachedOnly<C, V> {
    pub(crate) fn new(inner: C, owner: Arc<Owner<V>>) -> Self {
        let ticket = owner.epoch();
        Self {
            inner,
            owner,
            ticket,
        }
    }
}

impl<T, C, V> Callback<T> for AttachedOnly<C, V>
where
    C: Callback<T>,
    V: ?Sized + Send + Sync,
{
    fn on_success(&self, response: T) {
        if self.owner.accepts(self.ticket) {
            self.inner.on_success(response);
        } else {
            debug!(ticket = self.ticket, "success suppressed, owner detached");
        }
    }

    fn on_failure(&self, error: UseCaseError) {
        if self.owner.accepts(self.ticket) {
            self.inner.on_failure(error);
        } else {
            debug!(ticket = self.ticket, error = %error, "failure suppressed, owner detached");
        }
    }
}

/// Renders outcomes on whatever view is attached at delivery time.
pub struct Render<V: ?Sized> {
    owner: Arc<Owner<V>>,
}

impl<V: ?Sized> Render<V> {
    pub(crate) fn new(owner: Arc<Owner<V>>) -> Self {
        Self { owner }
    }
}

impl<V> Callback<V::Model> for Render<V>
where
    V: View + ?Sized,
{
    fn on_success(&self, response: V::Model) {
        if let Some(view) = self.owner.view() {
            view.on_result(response);
        }
    }

    fn on_failure(&self, error: UseCaseError) {
        if let Some(view) = self.owner.view() {
            view.on_show_message(&error.to_string());
        }
    }
}
