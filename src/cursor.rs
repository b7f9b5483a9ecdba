//! Lazy, hydrating wrapper over a deferred query cursor.

use std::marker::PhantomData;

use futures::TryStreamExt;
use futures::future::BoxFuture;

use crate::driver::DocumentStream;
use crate::error::DaoResult;
use crate::model::Model;

/// A query result that has not touched the database yet.
///
/// Constructing one stores the `connect → open cursor` chain without polling
/// it; no network I/O happens until [`to_array`](Self::to_array) or
/// [`to_cursor`](Self::to_cursor) is awaited.
///
/// The wrapped cursor is single-use: materializing an already exhausted
/// cursor legitimately yields an empty sequence. That is a property of the
/// underlying driver cursor and is deliberately not hidden behind caching.
pub struct LazyCursor<M> {
    cursor: BoxFuture<'static, DaoResult<DocumentStream>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> LazyCursor<M> {
    pub(crate) fn new(cursor: BoxFuture<'static, DaoResult<DocumentStream>>) -> Self {
        Self {
            cursor,
            _model: PhantomData,
        }
    }

    /// Resolve the underlying raw cursor, unhydrated.
    pub async fn to_cursor(self) -> DaoResult<DocumentStream> {
        self.cursor.await
    }

    /// Materialize every raw document and map each through the model factory.
    pub async fn to_array(self) -> DaoResult<Vec<M>> {
        let mut stream = self.cursor.await?;
        let mut models = Vec::new();
        while let Some(document) = stream.try_next().await? {
            models.push(M::from_document(document)?);
        }
        Ok(models)
    }
}
