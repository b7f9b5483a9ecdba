//! The driver seam: traits over the underlying document-store client.
//!
//! The DAO orchestrates an existing client library rather than speaking the
//! wire protocol itself. Everything it needs from that library is captured
//! here: dialing a connection string, resolving collection handles, and the
//! raw collection operations. The production implementation over the official
//! MongoDB driver lives in [`crate::mongo`]; a deterministic in-memory
//! implementation for tests lives in [`crate::testing`].

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;

use crate::error::DaoResult;
use crate::types::{AggregateOptions, FindOptions, UpdateOptions, WriteOutcome};

/// A stream of raw documents produced by `find`/`aggregate`.
///
/// Single-use: once exhausted, re-iteration yields nothing. This mirrors the
/// underlying driver's cursor semantics and is not papered over with caching.
pub type DocumentStream = BoxStream<'static, DaoResult<Document>>;

/// Dials connections. One driver instance backs a whole
/// [`ConnectionRegistry`](crate::registry::ConnectionRegistry).
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Establish a connection for a canonical connection string.
    ///
    /// Suspends until the connection is live or the attempt fails; the
    /// registry guarantees at most one in-flight call per identity.
    async fn connect(&self, identity: &str) -> DaoResult<Arc<dyn Connection>>;
}

/// A live connection to one database.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Resolve a collection handle by name.
    fn collection(&self, name: &str) -> Box<dyn CollectionHandle>;

    /// List the names of all collections in the database.
    async fn collection_names(&self) -> DaoResult<Vec<String>>;

    /// Drop a collection.
    async fn drop_collection(&self, name: &str) -> DaoResult<()>;

    /// Resolve with a cause once the connection closes unexpectedly.
    ///
    /// Never resolves for connections that outlive the process. The registry
    /// awaits this to evict dead entries.
    async fn closed(&self) -> String;
}

/// Raw operations on one collection. Queries, updates and pipelines are
/// opaque BSON payloads passed through to the store.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    /// Count documents matching a query.
    async fn count(&self, query: Document) -> DaoResult<u64>;

    /// Open a cursor over matching documents.
    async fn find(&self, query: Document, options: FindOptions) -> DaoResult<DocumentStream>;

    /// Fetch the first matching document, if any.
    async fn find_one(&self, query: Document) -> DaoResult<Option<Document>>;

    /// Upsert-style save: insert when the document has no identity,
    /// replace-by-identity otherwise.
    async fn save(&self, document: Document) -> DaoResult<WriteOutcome>;

    /// Apply an update to matching documents.
    async fn update(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DaoResult<WriteOutcome>;

    /// Remove every matching document, returning the removed count.
    async fn remove(&self, query: Document) -> DaoResult<u64>;

    /// Distinct values of a field across matching documents.
    async fn distinct(&self, field: &str, query: Document) -> DaoResult<Vec<Bson>>;

    /// Run an aggregation pipeline and open a cursor over its results.
    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> DaoResult<DocumentStream>;
}
