//! Deterministic in-memory driver for tests.
//!
//! Implements the [`driver`](crate::driver) seam over a mutex-guarded map of
//! collections, so the facade, registry, operators and cursors can be
//! exercised without a running server. Shipped with the crate so downstream
//! test suites can do the same.
//!
//! Semantics are intentionally simple: queries match on field equality
//! (subset match), updates understand `$set` and replacement documents, and
//! aggregation pipelines are not interpreted; `aggregate` replays the
//! collection contents.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::driver::{CollectionHandle, Connection, DocumentStream, Driver};
use crate::error::{DaoError, DaoResult, UNSUPPORTED_FIELD_PATH_CODES};
use crate::types::{AggregateOptions, FindOptions, UpdateOptions, WriteOutcome};

/// In-memory driver with controllable connect behavior.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    connect_calls: AtomicUsize,
    connect_delay: Mutex<Duration>,
    failures_remaining: AtomicUsize,
    close_tx: Mutex<Option<watch::Sender<Option<String>>>>,
}

impl MockDriver {
    /// Create an empty mock driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upcast to the driver trait object a registry expects.
    pub fn into_arc(self) -> Arc<dyn Driver> {
        Arc::new(self)
    }

    /// Number of times `connect` has been called.
    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    /// Delay every connect attempt, so concurrent callers overlap.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Fire the close notification of the most recent connection.
    pub fn close_current(&self, cause: &str) {
        if let Some(close_tx) = self.state.close_tx.lock().as_ref() {
            let _ = close_tx.send(Some(cause.to_string()));
        }
    }

    /// Seed a collection with documents.
    pub fn seed(&self, collection: &str, documents: Vec<Document>) {
        self.state
            .collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    /// Snapshot the contents of a collection.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(&self, _identity: &str) -> DaoResult<Arc<dyn Connection>> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .state
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(DaoError::connection("mock connect failure"));
        }

        let (close_tx, close_rx) = watch::channel(None);
        *self.state.close_tx.lock() = Some(close_tx);

        Ok(Arc::new(MockConnection {
            state: Arc::clone(&self.state),
            close_rx,
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
    close_rx: watch::Receiver<Option<String>>,
}

#[async_trait]
impl Connection for MockConnection {
    fn collection(&self, name: &str) -> Box<dyn CollectionHandle> {
        Box::new(MockCollection {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        })
    }

    async fn collection_names(&self) -> DaoResult<Vec<String>> {
        let mut names: Vec<String> = self.state.collections.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn drop_collection(&self, name: &str) -> DaoResult<()> {
        self.state.collections.lock().remove(name);
        Ok(())
    }

    async fn closed(&self) -> String {
        let mut close_rx = self.close_rx.clone();
        loop {
            if let Some(cause) = close_rx.borrow_and_update().clone() {
                return cause;
            }
            if close_rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

struct MockCollection {
    state: Arc<MockState>,
    name: String,
}

/// Subset match: every field in the query equals the document's field.
fn matches(document: &Document, query: &Document) -> bool {
    query
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}

/// Apply an update to one document, returning whether it changed.
fn apply_update(document: &mut Document, update: &Document) -> bool {
    if let Ok(set) = update.get_document("$set") {
        let mut changed = false;
        for (key, value) in set {
            if document.get(key) != Some(value) {
                document.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    } else {
        // Replacement semantics: keep the identity, replace the rest.
        let mut replacement = update.clone();
        if let Some(id) = document.get("_id").cloned() {
            replacement.insert("_id", id);
        }
        let changed = *document != replacement;
        *document = replacement;
        changed
    }
}

fn stream_of(documents: Vec<Document>) -> DocumentStream {
    futures::stream::iter(documents.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl CollectionHandle for MockCollection {
    async fn count(&self, query: Document) -> DaoResult<u64> {
        let collections = self.state.collections.lock();
        let documents = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        Ok(documents.iter().filter(|doc| matches(doc, &query)).count() as u64)
    }

    async fn find(&self, query: Document, options: FindOptions) -> DaoResult<DocumentStream> {
        let collections = self.state.collections.lock();
        let documents = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.unwrap_or(i64::MAX).max(0) as usize;
        let selected: Vec<Document> = documents
            .iter()
            .filter(|doc| matches(doc, &query))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect();
        Ok(stream_of(selected))
    }

    async fn find_one(&self, query: Document) -> DaoResult<Option<Document>> {
        let collections = self.state.collections.lock();
        let documents = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        Ok(documents.iter().find(|doc| matches(doc, &query)).cloned())
    }

    async fn save(&self, mut document: Document) -> DaoResult<WriteOutcome> {
        let mut collections = self.state.collections.lock();
        let documents = collections.entry(self.name.clone()).or_default();

        match document.get("_id").cloned() {
            Some(id) if id != Bson::Null => {
                let existing = documents
                    .iter_mut()
                    .find(|doc| doc.get("_id") == Some(&id));
                match existing {
                    Some(slot) => {
                        let modified = *slot != document;
                        *slot = document;
                        Ok(WriteOutcome {
                            matched_count: 1,
                            modified_count: u64::from(modified),
                            upserted_id: None,
                        })
                    }
                    None => {
                        documents.push(document);
                        Ok(WriteOutcome {
                            matched_count: 0,
                            modified_count: 0,
                            upserted_id: Some(id),
                        })
                    }
                }
            }
            _ => {
                let id = ObjectId::new();
                document.insert("_id", id);
                documents.push(document);
                Ok(WriteOutcome {
                    matched_count: 0,
                    modified_count: 0,
                    upserted_id: Some(Bson::ObjectId(id)),
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
        // The operator strips the write-concern option before the seam;
        // anything arriving here is a pass-through bug.
        if options.w.is_some() {
            return Err(DaoError::argument(
                "write concern option reached the driver seam",
            ));
        }

        let mut collections = self.state.collections.lock();
        let documents = collections.entry(self.name.clone()).or_default();

        let mut matched = 0u64;
        let mut modified = 0u64;
        for document in documents.iter_mut().filter(|doc| matches(doc, &query)) {
            matched += 1;
            if apply_update(document, &update) {
                modified += 1;
            }
            if !options.multi {
                break;
            }
        }

        if matched == 0 && options.upsert {
            let mut document = query.clone();
            apply_update(&mut document, &update);
            let id = Bson::ObjectId(ObjectId::new());
            document.insert("_id", id.clone());
            documents.push(document);
            return Ok(WriteOutcome {
                matched_count: 0,
                modified_count: 0,
                upserted_id: Some(id),
            });
        }

        Ok(WriteOutcome {
            matched_count: matched,
            modified_count: modified,
            upserted_id: None,
        })
    }

    async fn remove(&self, query: Document) -> DaoResult<u64> {
        let mut collections = self.state.collections.lock();
        let documents = collections.entry(self.name.clone()).or_default();
        let before = documents.len();
        documents.retain(|doc| !matches(doc, &query));
        Ok((before - documents.len()) as u64)
    }

    async fn distinct(&self, field: &str, query: Document) -> DaoResult<Vec<Bson>> {
        if field.starts_with('$') {
            return Err(DaoError::operation(
                Some(UNSUPPORTED_FIELD_PATH_CODES[0]),
                "FieldPath field names may not start with '$'",
            ));
        }
        let collections = self.state.collections.lock();
        let documents = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        let mut values = Vec::new();
        for document in documents.iter().filter(|doc| matches(doc, &query)) {
            if let Some(value) = document.get(field) {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        Ok(values)
    }

    async fn aggregate(
        &self,
        _pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> DaoResult<DocumentStream> {
        let collections = self.state.collections.lock();
        let documents = collections.get(&self.name).cloned().unwrap_or_default();
        Ok(stream_of(documents))
    }
}
