//! Read-through fallback across a primary and an archive database.

use bson::Document;
use tracing::error;

use crate::dao::Dao;
use crate::error::DaoResult;
use crate::model::Model;
use crate::types::FindOptions;

/// Composes a primary facade with an optional archive facade.
///
/// Reads go to the primary first; only a clean miss (empty result or `None`)
/// consults the archive. Errors from the primary propagate without touching
/// the archive, and nothing is ever written through or synchronized between
/// the two databases.
pub struct ArchiveDao {
    primary: Dao,
    archive: Option<Dao>,
}

impl ArchiveDao {
    /// Create a fallback facade. Without an archive it behaves exactly like
    /// the primary.
    pub fn new(primary: Dao, archive: Option<Dao>) -> Self {
        Self { primary, archive }
    }

    /// Query the primary, falling back to the archive on an empty result.
    pub async fn find<M: Model>(
        &self,
        query: Document,
        options: FindOptions,
    ) -> DaoResult<Vec<M>> {
        let results = self
            .primary
            .for_model::<M>()
            .find(query.clone(), options.clone())
            .to_array()
            .await
            .map_err(|err| {
                error!(error = %err, "archive fallback: error performing find");
                err
            })?;

        if results.is_empty() {
            if let Some(archive) = &self.archive {
                return archive
                    .for_model::<M>()
                    .find(query, options)
                    .to_array()
                    .await
                    .map_err(|err| {
                        error!(error = %err, "archive fallback: error performing find");
                        err
                    });
            }
        }
        Ok(results)
    }

    /// Fetch by id from the primary, falling back to the archive on a miss.
    pub async fn find_by_id<M: Model>(&self, id: &str) -> DaoResult<Option<M>> {
        let result = self
            .primary
            .for_model::<M>()
            .find_by_id(id)
            .await
            .map_err(|err| {
                error!(error = %err, "archive fallback: error performing find_by_id");
                err
            })?;

        if result.is_none() {
            if let Some(archive) = &self.archive {
                return archive.for_model::<M>().find_by_id(id).await.map_err(|err| {
                    error!(error = %err, "archive fallback: error performing find_by_id");
                    err
                });
            }
        }
        Ok(result)
    }
}
