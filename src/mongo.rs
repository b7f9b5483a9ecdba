//! Production driver seam implementation over the official MongoDB driver.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::event::cmap::{CmapEventHandler, PoolClearedEvent};
use mongodb::{Client, Database};
use tokio::sync::watch;
use tracing::debug;

use crate::driver::{CollectionHandle, Connection, DocumentStream, Driver};
use crate::error::{DaoError, DaoResult};
use crate::types::{AggregateOptions, FindOptions, UpdateOptions, WriteOutcome};

/// Driver that dials through [`mongodb::Client`].
#[derive(Debug, Default)]
pub struct MongoDriver;

impl MongoDriver {
    /// Create a new driver.
    pub fn new() -> Self {
        Self
    }
}

/// The canonical identity is scheme-less and may carry `authMechanism=DEFAULT`
/// (meaning driver-negotiated). The Rust driver negotiates when the parameter
/// is absent and rejects the literal value, so it is stripped before dialing.
fn dial_uri(identity: &str) -> String {
    let identity = identity
        .replace("?authMechanism=DEFAULT&", "?")
        .replace("?authMechanism=DEFAULT", "")
        .replace("&authMechanism=DEFAULT", "");
    format!("mongodb://{identity}")
}

#[async_trait]
impl Driver for MongoDriver {
    async fn connect(&self, identity: &str) -> DaoResult<Arc<dyn Connection>> {
        let uri = dial_uri(identity);
        let mut options = mongodb::options::ClientOptions::parse(&uri)
            .await
            .map_err(|err| DaoError::connection(format!("failed to parse connection string: {err}")))?;

        let database_name = options
            .default_database
            .clone()
            .ok_or_else(|| DaoError::config("connection string is missing a database name"))?;

        let (close_tx, close_rx) = watch::channel(None);
        options.app_name.get_or_insert_with(|| "mongo-dao".to_string());
        options.cmap_event_handler = Some(Arc::new(CloseMonitor { close_tx }));

        let client = Client::with_options(options)
            .map_err(|err| DaoError::connection(format!("failed to create client: {err}")))?;
        let database = client.database(&database_name);

        // The client dials lazily; ping so a dead server fails the connect
        // attempt instead of the first operation.
        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|err| DaoError::connection(err.to_string()))?;

        Ok(Arc::new(MongoConnection { database, close_rx }))
    }
}

/// Forwards the driver's pool-invalidation event as a close notification.
struct CloseMonitor {
    close_tx: watch::Sender<Option<String>>,
}

impl CmapEventHandler for CloseMonitor {
    fn handle_pool_cleared_event(&self, event: PoolClearedEvent) {
        let _ = self
            .close_tx
            .send(Some(format!("connection pool cleared for {}", event.address)));
    }
}

struct MongoConnection {
    database: Database,
    close_rx: watch::Receiver<Option<String>>,
}

#[async_trait]
impl Connection for MongoConnection {
    fn collection(&self, name: &str) -> Box<dyn CollectionHandle> {
        Box::new(MongoCollection {
            collection: self.database.collection::<Document>(name),
        })
    }

    async fn collection_names(&self) -> DaoResult<Vec<String>> {
        let names = self.database.list_collection_names(None).await?;
        Ok(names)
    }

    async fn drop_collection(&self, name: &str) -> DaoResult<()> {
        debug!(collection = %name, "dropping collection");
        self.database.collection::<Document>(name).drop(None).await?;
        Ok(())
    }

    async fn closed(&self) -> String {
        let mut close_rx = self.close_rx.clone();
        loop {
            if let Some(cause) = close_rx.borrow_and_update().clone() {
                return cause;
            }
            if close_rx.changed().await.is_err() {
                // Sender gone with no close recorded; never resolve.
                futures::future::pending::<()>().await;
            }
        }
    }
}

struct MongoCollection {
    collection: mongodb::Collection<Document>,
}

#[async_trait]
impl CollectionHandle for MongoCollection {
    async fn count(&self, query: Document) -> DaoResult<u64> {
        let count = self.collection.count_documents(query, None).await?;
        Ok(count)
    }

    async fn find(&self, query: Document, options: FindOptions) -> DaoResult<DocumentStream> {
        let mut find_options = mongodb::options::FindOptions::default();
        find_options.limit = options.limit;
        find_options.skip = options.skip;
        find_options.sort = options.sort;
        find_options.projection = options.projection;

        let cursor = self.collection.find(query, find_options).await?;
        Ok(cursor.map_err(DaoError::from).boxed())
    }

    async fn find_one(&self, query: Document) -> DaoResult<Option<Document>> {
        let document = self.collection.find_one(query, None).await?;
        Ok(document)
    }

    async fn save(&self, mut document: Document) -> DaoResult<WriteOutcome> {
        match document.get("_id").cloned() {
            Some(id) if id != Bson::Null => {
                let mut options = mongodb::options::ReplaceOptions::default();
                options.upsert = Some(true);
                let result = self
                    .collection
                    .replace_one(doc! { "_id": id }, document, options)
                    .await?;
                Ok(WriteOutcome {
                    matched_count: result.matched_count,
                    modified_count: result.modified_count,
                    upserted_id: result.upserted_id,
                })
            }
            _ => {
                document.remove("_id");
                let result = self.collection.insert_one(document, None).await?;
                Ok(WriteOutcome {
                    matched_count: 0,
                    modified_count: 0,
                    upserted_id: Some(result.inserted_id),
                })
            }
        }
    }

    async fn update(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DaoResult<WriteOutcome> {
        // The write-concern (`w`) option is stripped by the operator before
        // it reaches this seam; the client's configured write concern applies.
        let mut update_options = mongodb::options::UpdateOptions::default();
        update_options.upsert = Some(options.upsert);

        let result = if options.multi {
            self.collection
                .update_many(query, update, update_options)
                .await?
        } else {
            self.collection
                .update_one(query, update, update_options)
                .await?
        };

        Ok(WriteOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn remove(&self, query: Document) -> DaoResult<u64> {
        let result = self.collection.delete_many(query, None).await?;
        Ok(result.deleted_count)
    }

    async fn distinct(&self, field: &str, query: Document) -> DaoResult<Vec<Bson>> {
        let values = self.collection.distinct(field, query, None).await?;
        Ok(values)
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> DaoResult<DocumentStream> {
        let mut aggregate_options = mongodb::options::AggregateOptions::default();
        aggregate_options.allow_disk_use = Some(options.allow_disk_use);
        aggregate_options.batch_size = Some(options.batch_size);

        let cursor = self.collection.aggregate(pipeline, aggregate_options).await?;
        Ok(cursor.map_err(DaoError::from).boxed())
    }
}
