//! FindById - Repository から 1 件取得する UseCase

use std::marker::PhantomData;
use std::sync::Arc;

use super::{Completion, UseCase};
use crate::ports::Repository;

/// Looks an entity up by key and reports it through the completion.
///
/// Request: the key. Response: the entity. A repository miss arrives as
/// `on_not_available` and becomes the use case failure.
pub struct FindById<K, E, R: ?Sized> {
    repository: Arc<R>,
    _marker: PhantomData<fn(K) -> E>,
}

impl<K, E, R: ?Sized> FindById<K, E, R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            _marker: PhantomData,
        }
    }
}

impl<K, E, R> UseCase for FindById<K, E, R>
where
    K: Send + 'static,
    E: Send + 'static,
    R: Repository<K, E> + ?Sized + 'static,
{
    type Request = K;
    type Response = E;

    fn execute(&self, key: K, completion: Completion<E>) {
        self.repository.find_by_id(&key, Box::new(completion));
    }

    fn name(&self) -> &'static str {
        "find_by_id"
    }
}
