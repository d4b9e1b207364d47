//! Connection establishment with bounded retry.

use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use hashrec_storage::{
    ConnectionParams, Connector, HashStore, MemoryConnector, RedisConnector, StorageError,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Pause between two connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Connection counters of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Connection attempts made.
    pub attempts: u64,
    /// Handles handed out.
    pub opened: u64,
    /// Attempts followed by another attempt.
    pub retries: u64,
    /// Calls that ended in [`CoreError::ConnectionFailure`].
    pub failures: u64,
}

/// Opens store handles for logical databases.
///
/// Holds two connectors: one for real servers and one for the in-memory
/// fake used when a schema or the settings ask for testing. The fake keeps
/// one server per `host:port` for the lifetime of the manager.
pub struct ConnectionManager {
    remote: Arc<dyn Connector>,
    fake: Arc<dyn Connector>,
    stats: RwLock<ConnectionStats>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("stats", &*self.stats.read())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    /// Creates a manager backed by Redis and a fresh in-memory fake.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connectors(Arc::new(RedisConnector::new()), Arc::new(MemoryConnector::new()))
    }

    /// Creates a manager with explicit connectors.
    #[must_use]
    pub fn with_connectors(remote: Arc<dyn Connector>, fake: Arc<dyn Connector>) -> Self {
        Self {
            remote,
            fake,
            stats: RwLock::new(ConnectionStats::default()),
        }
    }

    /// Returns a snapshot of the connection counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        *self.stats.read()
    }

    /// Opens and pings a handle to logical database `db`.
    ///
    /// Makes up to `settings.retry.effective_attempts()` attempts, waiting
    /// [`RETRY_DELAY`] between them. Only transient failures are retried.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConnectionFailure`] with the last error once the
    /// attempts are exhausted, or [`CoreError::Storage`] for a failure that
    /// is not transient.
    pub fn connect(&self, db: u32, settings: &Settings, testing: bool) -> CoreResult<Box<dyn HashStore>> {
        let connector = if testing { &self.fake } else { &self.remote };
        let params = settings.connection_params(db);
        let attempts = settings.retry.effective_attempts();
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(RETRY_DELAY);
                self.stats.write().retries += 1;
            }
            self.stats.write().attempts += 1;

            match open(connector.as_ref(), &params) {
                Ok(store) => {
                    self.stats.write().opened += 1;
                    tracing::debug!(host = %params.host, port = params.port, db, testing, "connected");
                    return Ok(store);
                }
                Err(err) if err.is_transient() => {
                    if attempt + 1 < attempts {
                        tracing::warn!(db, attempt = attempt + 1, attempts, error = %err, "connection failed, retrying");
                    }
                    last_error = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.stats.write().failures += 1;
        Err(CoreError::ConnectionFailure {
            db,
            attempts,
            source: last_error.unwrap_or(StorageError::Closed),
        })
    }
}

fn open(
    connector: &dyn Connector,
    params: &ConnectionParams,
) -> Result<Box<dyn HashStore>, StorageError> {
    let mut store = connector.open(params)?;
    store.ping()?;
    Ok(store)
}
