//! Process-wide connection cache with single-flight establishment.
//!
//! The registry maps each canonical connection string to a single in-flight
//! or completed connection future. The first caller for an identity installs
//! the future under the map lock before awaiting it, so concurrent callers
//! attach to the same attempt instead of dialing twice. Entries are replaced,
//! never mutated: a failed attempt or an unexpectedly closed connection
//! evicts its entry, and the next `connect()` starts over.
//!
//! The registry is an explicit object constructed once per process and handed
//! to every facade; there is no module-level global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{error, info};

use crate::driver::{Connection, Driver};
use crate::error::{DaoError, DaoResult};

/// The connect future shared by every caller attached to one attempt.
/// The error side is `Arc`-wrapped so a failure can be handed to all of them.
type SharedConnect = Shared<BoxFuture<'static, Result<Arc<dyn Connection>, Arc<DaoError>>>>;

struct Entry {
    /// Identifies the establishment attempt so eviction cannot remove a
    /// newer entry for the same identity.
    epoch: u64,
    future: SharedConnect,
}

/// Cache of established (and in-flight) connections keyed by connection
/// string identity.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    driver: Arc<dyn Driver>,
    entries: Mutex<HashMap<String, Entry>>,
    epochs: AtomicU64,
}

impl ConnectionRegistry {
    /// Create a registry over the given driver.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                entries: Mutex::new(HashMap::new()),
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// Create a registry backed by the official MongoDB driver.
    pub fn with_mongo_driver() -> Self {
        Self::new(Arc::new(crate::mongo::MongoDriver::new()))
    }

    /// Whether an in-flight or completed entry exists for the identity.
    pub fn contains(&self, identity: &str) -> bool {
        self.inner.entries.lock().contains_key(identity)
    }

    /// Return the shared connection for an identity, establishing it when
    /// absent.
    ///
    /// For N concurrent calls against the same identity the underlying
    /// driver dials exactly once. A connect failure is propagated to every
    /// attached caller and is not cached: the entry is evicted before the
    /// error surfaces, so the next call retries from scratch.
    pub async fn connect(&self, identity: &str) -> DaoResult<Arc<dyn Connection>> {
        let future = {
            let mut entries = self.inner.entries.lock();
            match entries.get(identity) {
                Some(entry) => entry.future.clone(),
                None => {
                    let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed);
                    let future = establish(
                        self.inner.driver.clone(),
                        Arc::downgrade(&self.inner),
                        identity.to_string(),
                        epoch,
                    )
                    .boxed()
                    .shared();
                    entries.insert(
                        identity.to_string(),
                        Entry {
                            epoch,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        future.await.map_err(|cause| match &*cause {
            DaoError::Connection(message) => DaoError::connection(message.clone()),
            other => DaoError::connection(other.to_string()),
        })
    }
}

/// Run one establishment attempt. Exactly one of these executes per entry,
/// however many callers are attached to the shared future.
async fn establish(
    driver: Arc<dyn Driver>,
    registry: Weak<Inner>,
    identity: String,
    epoch: u64,
) -> Result<Arc<dyn Connection>, Arc<DaoError>> {
    info!(identity = %identity, "connecting to mongo");

    match driver.connect(&identity).await {
        Ok(connection) => {
            info!(identity = %identity, "connected to mongo");
            let watched = Arc::clone(&connection);
            tokio::spawn(async move {
                let cause = watched.closed().await;
                error!(
                    identity = %identity,
                    cause = %cause,
                    "connection to mongo unexpectedly closed"
                );
                if let Some(inner) = registry.upgrade() {
                    inner.evict(&identity, epoch);
                }
            });
            Ok(connection)
        }
        Err(err) => {
            error!(identity = %identity, error = %err, "failed to connect to mongo");
            if let Some(inner) = registry.upgrade() {
                inner.evict(&identity, epoch);
            }
            Err(Arc::new(err))
        }
    }
}

impl Inner {
    /// Remove the entry for an identity, provided it still belongs to the
    /// attempt that requested the eviction.
    fn evict(&self, identity: &str, epoch: u64) {
        let mut entries = self.entries.lock();
        if entries.get(identity).is_some_and(|entry| entry.epoch == epoch) {
            entries.remove(identity);
        }
    }
}
