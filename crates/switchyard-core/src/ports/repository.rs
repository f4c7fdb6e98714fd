//! Repository port - データ層の境界
//!
//! 検索結果はコールバック（`SingleResult`）で返す。永続化の実装はこのクレートの外。

use crate::domain::UseCaseError;
use crate::usecase::Completion;

/// Receiver of a single lookup result.
pub trait SingleResult<T>: Send {
    fn on_available(self: Box<Self>, value: T);
    fn on_not_available(self: Box<Self>, error: UseCaseError);
}

/// Keyed entity store consumed by use cases.
pub trait Repository<K, E>: Send + Sync {
    fn find_by_id(&self, key: &K, callback: Box<dyn SingleResult<E>>);
    fn save(&self, entity: E) -> Result<(), UseCaseError>;
    fn delete(&self, entity: &E) -> Result<(), UseCaseError>;
}

impl<T> SingleResult<T> for Completion<T> {
    fn on_available(self: Box<Self>, value: T) {
        (*self).pass(value)
    }

    fn on_not_available(self: Box<Self>, error: UseCaseError) {
        (*self).fail(error)
    }
}
