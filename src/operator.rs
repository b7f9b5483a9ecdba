//! Typed CRUD operations bound to one collection.

use std::marker::PhantomData;

use bson::{Bson, Document, doc};
use futures::FutureExt;
use tracing::debug;

use crate::cursor::LazyCursor;
use crate::dao::Dao;
use crate::error::DaoResult;
use crate::model::{Model, parse_object_id};
use crate::types::{AggregateOptions, FindOptions, RemoveReport, UpdateOptions, UpdateReport};

/// CRUD surface for one model, bound to one collection and its hydration
/// factory.
///
/// Every operation suspends on the facade's `connect()` step, except `find`
/// and `find_aggregate` which return a [`LazyCursor`] immediately and defer
/// the connection until the cursor is materialized.
pub struct Operator<M> {
    dao: Dao,
    collection: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Operator<M> {
    pub(crate) fn new(dao: Dao, collection: String) -> Self {
        Self {
            dao,
            collection,
            _model: PhantomData,
        }
    }

    /// Name of the collection this operator is bound to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Count documents matching the query.
    pub async fn count(&self, query: Document) -> DaoResult<u64> {
        let connection = self.dao.connect().await?;
        connection.collection(&self.collection).count(query).await
    }

    /// Query the collection, returning a lazy cursor.
    ///
    /// Does not suspend: the returned cursor chains `connect()` and the
    /// driver's `find` and performs no I/O until materialized.
    pub fn find(&self, query: Document, options: FindOptions) -> LazyCursor<M> {
        let dao = self.dao.clone();
        let collection = self.collection.clone();
        LazyCursor::new(
            async move {
                let connection = dao.connect().await?;
                connection.collection(&collection).find(query, options).await
            }
            .boxed(),
        )
    }

    /// Fetch and hydrate the first matching document. Absence is `None`,
    /// never an error.
    pub async fn find_one(&self, query: Document) -> DaoResult<Option<M>> {
        let connection = self.dao.connect().await?;
        let document = connection
            .collection(&self.collection)
            .find_one(query)
            .await?;
        document.map(M::from_document).transpose()
    }

    /// Fetch a document by its string-encoded ObjectId.
    ///
    /// Fails with an argument error before any I/O when the string is not a
    /// valid ObjectId encoding.
    pub async fn find_by_id(&self, id: &str) -> DaoResult<Option<M>> {
        let id = parse_object_id(id)?;
        self.find_one(doc! { "_id": id }).await
    }

    /// Run an aggregation pipeline, returning a lazy cursor over hydrated
    /// results. Same laziness contract as [`find`](Self::find).
    pub fn find_aggregate(&self, pipeline: Vec<Document>) -> LazyCursor<M> {
        let dao = self.dao.clone();
        let collection = self.collection.clone();
        LazyCursor::new(
            async move {
                let connection = dao.connect().await?;
                connection
                    .collection(&collection)
                    .aggregate(pipeline, AggregateOptions::default())
                    .await
            }
            .boxed(),
        )
    }

    /// Apply an update to matching documents.
    ///
    /// Single-document by default; set `multi` to update every match. The
    /// write-concern (`w`) option is stripped before pass-through.
    pub async fn update(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DaoResult<UpdateReport> {
        let options = Self::clean_options(options);
        let connection = self.dao.connect().await?;
        let outcome = connection
            .collection(&self.collection)
            .update(query, update, options)
            .await?;
        Ok(UpdateReport {
            matched_count: outcome.matched_count,
            modified_count: outcome.modified_count,
            ok: true,
            updated_existing: outcome.modified_count > 0,
        })
    }

    /// Remove every document matching the query.
    pub async fn remove(&self, query: Document) -> DaoResult<RemoveReport> {
        let connection = self.dao.connect().await?;
        let deleted_count = connection.collection(&self.collection).remove(query).await?;
        Ok(RemoveReport {
            ok: true,
            deleted_count,
        })
    }

    /// Remove a document by its string-encoded ObjectId.
    pub async fn remove_by_id(&self, id: &str) -> DaoResult<RemoveReport> {
        let id = parse_object_id(id)?;
        self.remove(doc! { "_id": id }).await
    }

    /// Distinct values of a field across matching documents.
    ///
    /// An empty field resolves to an empty list without touching the store.
    /// A server rejection of the field path itself is downgraded to an empty
    /// list; every other error propagates.
    pub async fn distinct(&self, field: &str, query: Document) -> DaoResult<Vec<Bson>> {
        if field.is_empty() {
            return Ok(Vec::new());
        }
        let connection = self.dao.connect().await?;
        match connection
            .collection(&self.collection)
            .distinct(field, query)
            .await
        {
            Ok(values) => Ok(values),
            Err(err) if err.is_unsupported_field_path() => {
                debug!(
                    collection = %self.collection,
                    field = %field,
                    "distinct field path not supported, returning empty result"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Strip options that are not meaningful for an update pass-through.
    fn clean_options(mut options: UpdateOptions) -> UpdateOptions {
        options.w = None;
        options
    }
}
