//! The model contract: collection-name resolution and document hydration.

use bson::Document;
use bson::oid::ObjectId;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DaoError, DaoResult};

/// A domain type stored in one collection.
///
/// The two capabilities a type must supply to be used with
/// [`Dao::for_model`](crate::dao::Dao::for_model) are a deterministic
/// collection name and a hydration factory turning a raw document into the
/// domain type. Both have defaults: the collection name derives from the type
/// name (last path segment, lower-cased) and the factory is serde/bson
/// deserialization. Either can be overridden per type.
///
/// The layer never inspects a model's shape beyond the `_id` field (identity
/// adoption on save) and a conventional `updatedAt.value` field (timestamp
/// refresh when present).
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the collection this model is stored in.
    fn collection_name() -> String {
        derived_collection_name::<Self>()
    }

    /// Hydrate a model from a raw document.
    fn from_document(document: Document) -> DaoResult<Self> {
        bson::from_document(document).map_err(DaoError::from)
    }

    /// Serialize a model into a raw document.
    fn to_document(&self) -> DaoResult<Document> {
        bson::to_document(self).map_err(DaoError::from)
    }
}

/// Collection name derived from a type name: last path segment, lower-cased.
pub(crate) fn derived_collection_name<M: ?Sized>() -> String {
    let name = std::any::type_name::<M>();
    let name = name.split('<').next().unwrap_or(name);
    let name = name.rsplit("::").next().unwrap_or(name);
    name.to_lowercase()
}

/// Parse an ObjectId from its string encoding.
pub fn parse_object_id(id: &str) -> DaoResult<ObjectId> {
    ObjectId::parse_str(id)
        .map_err(|err| DaoError::argument(format!("invalid object id '{id}': {err}")))
}

/// Create a new ObjectId.
pub fn new_object_id() -> ObjectId {
    ObjectId::new()
}

/// Parse the given id, or mint a fresh one when absent.
pub fn object_id(id: Option<&str>) -> DaoResult<ObjectId> {
    match id {
        Some(id) => parse_object_id(id),
        None => Ok(new_object_id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Widget {
        name: String,
    }

    impl Model for Widget {}

    #[derive(Debug, Serialize, Deserialize)]
    struct DataMapResult {
        data_map_id: String,
    }

    impl Model for DataMapResult {
        fn collection_name() -> String {
            "a_simple_collection".to_string()
        }
    }

    #[test]
    fn test_collection_name_derived_from_type_name() {
        assert_eq!(Widget::collection_name(), "widget");
    }

    #[test]
    fn test_collection_name_override() {
        assert_eq!(DataMapResult::collection_name(), "a_simple_collection");
    }

    #[test]
    fn test_default_factory_round_trip() {
        let widget = Widget {
            name: "sprocket".to_string(),
        };
        let doc = widget.to_document().unwrap();
        let hydrated = Widget::from_document(doc).unwrap();
        assert_eq!(hydrated.name, "sprocket");
    }

    #[test]
    fn test_factory_rejects_malformed_document() {
        let doc = bson::doc! { "name": 42 };
        assert!(Widget::from_document(doc).is_err());
    }

    #[test]
    fn test_parse_object_id() {
        let id = "55b27c2a74757b3c5e121b0e";
        assert_eq!(parse_object_id(id).unwrap().to_hex(), id);

        let err = parse_object_id("not-an-id").unwrap_err();
        assert!(err.is_argument_error());
    }

    #[test]
    fn test_object_id_mints_when_absent() {
        let a = object_id(None).unwrap();
        let b = object_id(None).unwrap();
        assert_ne!(a, b);
    }
}
