//! UseCase - 1 つの非同期な業務ロジック
//!
//! # 契約
//! - `execute()` は Scheduler のワーカースレッド上で呼ばれる
//! - 完了時は `Completion` を通して success / failure のどちらか一方を、ちょうど 1 回だけ通知する
//! - panic や通知漏れは Scheduler / `Completion` が failure に変換する
//!
//! # 二層構造
//! - **UseCase**: 業務ロジック本体（`Arc<U>` で共有、リクエストは毎回 move で渡す）
//! - **Callback**: 結果の受け手（presenter / view 側）

pub mod completion;
pub mod lookup;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::domain::UseCaseError;

pub use self::completion::Completion;
pub use self::lookup::FindById;

/// Single executable unit of business logic.
///
/// # 使用例
/// ```ignore
/// struct Greet;
///
/// impl UseCase for Greet {
///     type Request = String;
///     type Response = String;
///
///     fn execute(&self, name: String, completion: Completion<String>) {
///         completion.pass(format!("hello, {name}"));
///     }
/// }
/// ```
pub trait UseCase: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Runs on a worker thread. Must resolve `completion`.
    fn execute(&self, request: Self::Request, completion: Completion<Self::Response>);

    /// Name used in logs and in scheduler-generated failures.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Receiver of a use case outcome.
pub trait Callback<T>: Send + Sync {
    fn on_success(&self, response: T);
    fn on_failure(&self, error: UseCaseError);
}

impl<T, C: Callback<T> + ?Sized> Callback<T> for Arc<C> {
    fn on_success(&self, response: T) {
        (**self).on_success(response)
    }

    fn on_failure(&self, error: UseCaseError) {
        (**self).on_failure(error)
    }
}

impl<T, C: Callback<T> + ?Sized> Callback<T> for Box<C> {
    fn on_success(&self, response: T) {
        (**self).on_success(response)
    }

    fn on_failure(&self, error: UseCaseError) {
        (**self).on_failure(error)
    }
}

/// Callback built from two closures. See [`callback`].
pub struct FnCallback<S, F> {
    on_success: S,
    on_failure: F,
}

/// Builds a [`Callback`] from a success closure and a failure closure.
pub fn callback<T, S, F>(on_success: S, on_failure: F) -> FnCallback<S, F>
where
    S: Fn(T) + Send + Sync,
    F: Fn(UseCaseError) + Send + Sync,
{
    FnCallback {
        on_success,
        on_failure,
    }
}

impl<T, S, F> Callback<T> for FnCallback<S, F>
where
    S: Fn(T) + Send + Sync,
    F: Fn(UseCaseError) + Send + Sync,
{
    fn on_success(&self, response: T) {
        (self.on_success)(response)
    }

    fn on_failure(&self, error: UseCaseError) {
        (self.on_failure)(error)
    }
}

/// Use case backed by a closure. See [`from_fn`].
pub struct FnUseCase<Req, Resp, F> {
    name: &'static str,
    body: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

/// Wraps a closure as a named [`UseCase`].
pub fn from_fn<Req, Resp, F>(name: &'static str, body: F) -> FnUseCase<Req, Resp, F>
where
    F: Fn(Req, Completion<Resp>) + Send + Sync + 'static,
{
    FnUseCase {
        name,
        body,
        _marker: PhantomData,
    }
}

impl<Req, Resp, F> UseCase for FnUseCase<Req, Resp, F>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: Fn(Req, Completion<Resp>) + Send + Sync + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn execute(&self, request: Req, completion: Completion<Resp>) {
        (self.body)(request, completion)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
