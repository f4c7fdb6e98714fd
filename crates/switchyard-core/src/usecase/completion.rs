//! Completion - 結果通知の一回限りのハンドル
//!
//! `pass` / `fail` / `complete` は self を消費するので二重通知は型で防がれる。
//! 通知せずに drop された場合は `UseCaseError::Abandoned` を通知する（ゼロ回通知の防止）。

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::Callback;
use crate::domain::UseCaseError;
use crate::sync::lock;

/// Shared cell holding the callback until someone resolves it.
///
/// The scheduler keeps a second handle so it can report panics and
/// cancellations for submissions whose `Completion` never resolved.
pub(crate) type CallbackSlot<T> = Arc<Mutex<Option<Box<dyn Callback<T>>>>>;

pub(crate) fn slot<T>(callback: impl Callback<T> + 'static) -> CallbackSlot<T> {
    Arc::new(Mutex::new(Some(Box::new(callback))))
}

pub(crate) fn take<T>(slot: &CallbackSlot<T>) -> Option<Box<dyn Callback<T>>> {
    lock(slot).take()
}

/// One-shot outcome handle handed to [`super::UseCase::execute`].
pub struct Completion<T> {
    task: &'static str,
    slot: CallbackSlot<T>,
}

impl<T> Completion<T> {
    /// Completion that reports straight to `callback`, outside any scheduler.
    pub fn new(task: &'static str, callback: impl Callback<T> + 'static) -> Self {
        Self::from_slot(task, slot(callback))
    }

    pub(crate) fn from_slot(task: &'static str, slot: CallbackSlot<T>) -> Self {
        Self { task, slot }
    }

    pub fn task_name(&self) -> &'static str {
        self.task
    }

    /// Report success.
    pub fn pass(self, response: T) {
        if let Some(callback) = take(&self.slot) {
            debug!(task = self.task, "use case succeeded");
            callback.on_success(response);
        }
    }

    /// Report failure.
    pub fn fail(self, error: impl Into<UseCaseError>) {
        if let Some(callback) = take(&self.slot) {
            let error = error.into();
            debug!(task = self.task, error = %error, "use case failed");
            callback.on_failure(error);
        }
    }

    /// Report whichever side `result` holds.
    pub fn complete<E: Into<UseCaseError>>(self, result: Result<T, E>) {
        match result {
            Ok(response) => self.pass(response),
            Err(error) => self.fail(error),
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        // unwind 中は Scheduler 側が Panicked として通知する
        if std::thread::panicking() {
            return;
        }
        if let Some(callback) = take(&self.slot) {
            warn!(task = self.task, "use case dropped its completion without an outcome");
            callback.on_failure(UseCaseError::Abandoned(self.task));
        }
    }
}
