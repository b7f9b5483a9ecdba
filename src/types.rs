//! Option and report types shared between the operators and the driver seam.

use bson::{Bson, Document};

/// Options for `find` operations.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Projection specification.
    pub projection: Option<Document>,
}

/// Options for `update` operations.
///
/// The write-concern (`w`) option is accepted for compatibility but stripped
/// by the operator before the update is passed through, since it is not
/// meaningful for this operation.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first.
    pub multi: bool,
    /// Insert when no document matches.
    pub upsert: bool,
    /// Write concern (`w`); stripped before pass-through.
    pub w: Option<i32>,
}

/// Options for `aggregate` operations.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Allow the server to spill pipeline stages to disk.
    pub allow_disk_use: bool,
    /// Server-side cursor batch size.
    pub batch_size: u32,
}

impl Default for AggregateOptions {
    // The facade always requests disk use and a batch size of 1000.
    fn default() -> Self {
        Self {
            allow_disk_use: true,
            batch_size: 1000,
        }
    }
}

/// Raw driver outcome of a write (save or update).
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// Number of documents matched by the filter.
    pub matched_count: u64,
    /// Number of documents actually modified.
    pub modified_count: u64,
    /// Identity generated for an inserted/upserted document, when any.
    pub upserted_id: Option<Bson>,
}

/// Result of an [`Operator::update`](crate::operator::Operator::update) call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    /// Number of documents matched by the query.
    pub matched_count: u64,
    /// Number of documents modified.
    pub modified_count: u64,
    /// Whether the server acknowledged the operation.
    pub ok: bool,
    /// Whether an existing document was changed (`modified_count > 0`).
    pub updated_existing: bool,
}

/// Result of an [`Operator::remove`](crate::operator::Operator::remove) call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveReport {
    /// Whether the server acknowledged the operation.
    pub ok: bool,
    /// Number of documents removed.
    pub deleted_count: u64,
}
