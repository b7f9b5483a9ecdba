//! # mongo-dao
//!
//! A typed data-access layer in front of MongoDB, providing:
//! - Shared connection management: one connection per canonical connection
//!   string, with single-flight establishment and automatic eviction of
//!   closed or failed connections
//! - A typed CRUD/query surface bound to a model's collection
//! - Lazy, factory-based cursors that hydrate raw documents into domain
//!   objects and perform no I/O until materialized
//! - A read-through archive fallback composing two facades
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongo_dao::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Widget {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     id: Option<ObjectId>,
//!     name: String,
//! }
//!
//! impl Model for Widget {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config: DbConfig = load_config()?;
//!
//!     // One registry per process; facades constructed from it share
//!     // connections whenever their configs normalize to the same identity.
//!     let registry = ConnectionRegistry::with_mongo_driver();
//!     let dao = Dao::new(&config, registry)?;
//!
//!     // Saved into the "widget" collection, derived from the type name.
//!     let widget = dao.save(Widget { id: None, name: "sprocket".into() }).await?;
//!
//!     // No I/O happens until the cursor is materialized.
//!     let cursor = dao.for_model::<Widget>().find(doc! {}, FindOptions::default());
//!     let widgets = cursor.to_array().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod cursor;
pub mod dao;
pub mod driver;
pub mod error;
pub mod model;
pub mod mongo;
pub mod operator;
pub mod registry;
pub mod testing;
pub mod types;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};

pub use archive::ArchiveDao;
pub use config::{AuthMechanism, DbConfig, DbOptions, ReadPreference};
pub use cursor::LazyCursor;
pub use dao::Dao;
pub use driver::{CollectionHandle, Connection, DocumentStream, Driver};
pub use error::{DaoError, DaoResult};
pub use model::{Model, new_object_id, object_id, parse_object_id};
pub use mongo::MongoDriver;
pub use operator::Operator;
pub use registry::ConnectionRegistry;
pub use types::{
    AggregateOptions, FindOptions, RemoveReport, UpdateOptions, UpdateReport, WriteOutcome,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::archive::ArchiveDao;
    pub use crate::config::{AuthMechanism, DbConfig, DbOptions, ReadPreference};
    pub use crate::cursor::LazyCursor;
    pub use crate::dao::Dao;
    pub use crate::error::{DaoError, DaoResult};
    pub use crate::model::Model;
    pub use crate::operator::Operator;
    pub use crate::registry::ConnectionRegistry;
    pub use crate::types::{AggregateOptions, FindOptions, UpdateOptions};
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
