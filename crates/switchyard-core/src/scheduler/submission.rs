//! Submission - リクエストとコールバックを束ねた、まだ実行されていない UseCase

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::UseCaseError;
use crate::usecase::completion::{self, Completion};
use crate::usecase::{Callback, UseCase};

/// What happens to a submission when it leaves the queue.
pub(crate) enum Disposition {
    Run,
    Cancel,
    Discard,
}

type Job = Box<dyn FnOnce(Disposition) + Send>;

/// A use case bound to its request and callback, waiting for a worker.
///
/// Returned by [`super::Scheduler::stop_execution`] for work that never
/// started. Dropping one cancels it: the callback receives
/// [`UseCaseError::Cancelled`].
pub struct Submission {
    task: &'static str,
    job: Option<Job>,
}

impl Submission {
    pub(crate) fn bind<U: UseCase>(
        task: Arc<U>,
        request: U::Request,
        callback: impl Callback<U::Response> + 'static,
    ) -> Self {
        let name = task.name();
        let slot = completion::slot(callback);
        let job = move |disposition: Disposition| match disposition {
            Disposition::Run => {
                let completion = Completion::from_slot(name, Arc::clone(&slot));
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| task.execute(request, completion)));
                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    warn!(task = name, %message, "use case panicked");
                    if let Some(callback) = completion::take(&slot) {
                        callback.on_failure(UseCaseError::Panicked {
                            task: name,
                            message,
                        });
                    }
                }
            }
            Disposition::Cancel => {
                if let Some(callback) = completion::take(&slot) {
                    debug!(task = name, "submission cancelled before start");
                    callback.on_failure(UseCaseError::Cancelled(name));
                }
            }
            Disposition::Discard => {
                completion::take(&slot);
            }
        };

        Self {
            task: name,
            job: Some(Box::new(job)),
        }
    }

    pub fn task_name(&self) -> &'static str {
        self.task
    }

    /// Deliver [`UseCaseError::Cancelled`] to the callback now.
    pub fn cancel(mut self) {
        self.dispose(Disposition::Cancel);
    }

    /// Drop the submission without notifying anyone.
    pub fn discard(mut self) {
        self.dispose(Disposition::Discard);
    }

    pub(crate) fn run(mut self) {
        self.dispose(Disposition::Run);
    }

    fn dispose(&mut self, disposition: Disposition) {
        if let Some(job) = self.job.take() {
            job(disposition);
        }
    }
}

impl Drop for Submission {
    fn drop(&mut self) {
        self.dispose(Disposition::Cancel);
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("task", &self.task)
            .field("pending", &self.job.is_some())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
