//! The data-access facade.

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use tracing::error;

use crate::config::DbConfig;
use crate::driver::{Connection, DocumentStream};
use crate::error::DaoResult;
use crate::model::Model;
use crate::operator::Operator;
use crate::registry::ConnectionRegistry;
use crate::types::AggregateOptions;

/// Facade over one database, identified by its canonical connection string.
///
/// Facades are cheap to clone and share the process-wide
/// [`ConnectionRegistry`] they were constructed with: two facades whose
/// configurations normalize to the same identity share one underlying
/// connection.
#[derive(Clone)]
pub struct Dao {
    identity: String,
    registry: ConnectionRegistry,
}

impl Dao {
    /// Create a facade for a configuration, validating its enumerated
    /// options.
    pub fn new(config: &DbConfig, registry: ConnectionRegistry) -> DaoResult<Self> {
        Ok(Self {
            identity: config.connection_string()?,
            registry,
        })
    }

    /// The canonical connection string identifying this facade's database.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Return the shared connection for this facade's identity, establishing
    /// it when absent. Suspends until the connection is live.
    pub async fn connect(&self) -> DaoResult<Arc<dyn Connection>> {
        self.registry.connect(&self.identity).await
    }

    /// Bind an operator to a model's collection and hydration factory.
    pub fn for_model<M: Model>(&self) -> Operator<M> {
        Operator::new(self.clone(), M::collection_name())
    }

    /// Upsert-style save of a model into its collection.
    ///
    /// When the model carries a conventional `updatedAt.value` field it is
    /// refreshed to the current time before the write; absence of the field
    /// leaves the document untouched. A model without an identity adopts the
    /// identity generated by the write, so the returned model always carries
    /// its stored `_id`.
    pub async fn save<M: Model>(&self, model: M) -> DaoResult<M> {
        let mut document = model.to_document()?;
        touch_updated_at(&mut document);

        let collection_name = M::collection_name();
        let connection = self.connect().await?;
        let outcome = connection
            .collection(&collection_name)
            .save(document.clone())
            .await
            .map_err(|err| {
                error!(collection = %collection_name, error = %err, "save error");
                err
            })?;

        let missing_id = !matches!(document.get("_id"), Some(id) if *id != Bson::Null);
        if missing_id {
            match outcome.upserted_id {
                Some(id) => {
                    document.insert("_id", id);
                }
                None => {
                    document.remove("_id");
                }
            }
        }
        M::from_document(document)
    }

    /// Run an aggregation pipeline against a collection, returning the raw
    /// cursor.
    ///
    /// Always requests disk-use allowance and a server-side batch size of
    /// 1000. Results are not hydrated; consume through
    /// [`Operator::find_aggregate`] for domain objects.
    pub async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> DaoResult<DocumentStream> {
        let connection = self.connect().await.map_err(|err| {
            error!(collection = %collection, error = %err, "aggregate error");
            err
        })?;
        connection
            .collection(collection)
            .aggregate(pipeline, AggregateOptions::default())
            .await
    }

    /// Drop a collection.
    pub async fn drop_collection(&self, collection: &str) -> DaoResult<()> {
        let connection = self.connect().await.map_err(|err| {
            error!(collection = %collection, error = %err, "drop collection error");
            err
        })?;
        connection.drop_collection(collection).await
    }

    /// List the names of all collections in the database.
    pub async fn collection_names(&self) -> DaoResult<Vec<String>> {
        let connection = self.connect().await?;
        connection.collection_names().await
    }

    /// Parse the given ObjectId string, or mint a fresh id when absent.
    pub fn object_id(&self, id: Option<&str>) -> DaoResult<ObjectId> {
        crate::model::object_id(id)
    }
}

/// Refresh a conventional `updatedAt.value` field in place, only when the
/// nested field already exists and is non-null.
fn touch_updated_at(document: &mut Document) {
    if let Some(Bson::Document(updated_at)) = document.get_mut("updatedAt") {
        if matches!(updated_at.get("value"), Some(value) if *value != Bson::Null) {
            let now = bson::DateTime::from_chrono(chrono::Utc::now());
            updated_at.insert("value", Bson::DateTime(now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_touch_updated_at_refreshes_existing_value() {
        let stale = bson::DateTime::from_millis(0);
        let mut document = doc! { "updatedAt": { "value": stale } };

        touch_updated_at(&mut document);

        let value = document
            .get_document("updatedAt")
            .unwrap()
            .get_datetime("value")
            .unwrap();
        let age_ms = bson::DateTime::now().timestamp_millis() - value.timestamp_millis();
        assert!(age_ms < 5_000, "expected a fresh timestamp, got {value}");
    }

    #[test]
    fn test_touch_updated_at_ignores_missing_field() {
        let mut document = doc! { "name": "widget" };
        touch_updated_at(&mut document);
        assert_eq!(document, doc! { "name": "widget" });
    }

    #[test]
    fn test_touch_updated_at_ignores_null_value() {
        let mut document = doc! { "updatedAt": { "value": Bson::Null } };
        touch_updated_at(&mut document);
        assert_eq!(document, doc! { "updatedAt": { "value": Bson::Null } });
    }

    #[test]
    fn test_touch_updated_at_ignores_scalar_updated_at() {
        let mut document = doc! { "updatedAt": "yesterday" };
        touch_updated_at(&mut document);
        assert_eq!(document, doc! { "updatedAt": "yesterday" });
    }
}
