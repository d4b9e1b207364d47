//! Test fixtures and database helpers.
//!
//! Every [`TestContext`] owns its own in-memory server, so tests do not share
//! state even when they run in parallel.

use hashrec_core::{ConnectionManager, Database, FieldType, Record, Schema, Settings};
use hashrec_storage::{
    ConnectionParams, Connector, HashStore, MemoryConnector, MemoryServer, StorageError,
    StorageResult,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Settings with the testing switch on.
#[must_use]
pub fn test_settings() -> Settings {
    Settings::new().testing(true)
}

/// A database routed to a private in-memory server.
pub struct TestContext {
    /// The database under test.
    pub db: Database,
    /// The fake connector behind `db`.
    pub fake: Arc<MemoryConnector>,
    /// Settings shared by the schemas built from this context.
    pub settings: Arc<Settings>,
}

impl TestContext {
    /// Creates a context with [`test_settings`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    /// Creates a context with `settings`, forcing the testing switch on.
    #[must_use]
    pub fn with_settings(settings: Settings) -> Self {
        let fake = Arc::new(MemoryConnector::new());
        let connections = ConnectionManager::with_connectors(fake.clone(), fake.clone());
        Self {
            db: Database::with_connections(Arc::new(connections)),
            fake,
            settings: Arc::new(settings.testing(true)),
        }
    }

    /// The `TestModel` schema: `attr1` (str id, no auto id), `attr2` (int)
    /// and `attr3` (float), in the `tests` database.
    #[must_use]
    pub fn test_model(&self) -> Arc<Schema> {
        Schema::builder("TestModel")
            .db("tests")
            .id_field("attr1")
            .auto_id(false)
            .field("attr1", FieldType::Str)
            .field("attr2", FieldType::Int)
            .field("attr3", FieldType::Float)
            .settings(Arc::clone(&self.settings))
            .build()
            .expect("TestModel schema is valid")
    }

    /// The fake server at the configured address.
    #[must_use]
    pub fn server(&self) -> MemoryServer {
        self.fake.server(&self.settings.host, self.settings.port)
    }

    /// A raw handle to logical database `db`, bypassing the record layer.
    #[must_use]
    pub fn raw(&self, db: u32) -> Box<dyn HashStore> {
        self.fake
            .open(&self.settings.connection_params(db))
            .expect("fake database is reachable")
    }

    /// Every key in logical database `db`, sorted.
    #[must_use]
    pub fn raw_keys(&self, db: u32) -> Vec<String> {
        let mut keys = self.raw(db).scan("*").expect("scan succeeds");
        keys.sort();
        keys
    }

    /// Overwrites one stored field without updating the digest.
    pub fn tamper(&self, db: u32, key: &str, field: &str, value: &str) {
        self.raw(db)
            .hset(key, &[(field.to_string(), value.to_string())])
            .expect("tampering write succeeds");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `TestModel` record.
#[must_use]
pub fn test_record(schema: &Arc<Schema>, attr1: &str, attr2: i64, attr3: f64) -> Record {
    Record::builder(schema)
        .set("attr1", attr1)
        .set("attr2", attr2)
        .set("attr3", attr3)
        .build()
        .expect("TestModel record is valid")
}

/// Sets up test logging, honouring `RUST_LOG` and defaulting to `warn`.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Connector that always fails and remembers when it was called.
#[derive(Debug)]
pub struct FailingConnector {
    error: StorageError,
    calls: Mutex<Vec<Instant>>,
}

impl FailingConnector {
    /// Fails every open with `error`.
    #[must_use]
    pub fn new(error: StorageError) -> Self {
        Self {
            error,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails every open with a refused connection.
    #[must_use]
    pub fn refusing() -> Self {
        Self::new(StorageError::Connection("connection refused".to_string()))
    }

    /// Number of opens so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.calls.lock().len()
    }

    /// When each open happened.
    #[must_use]
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

impl Connector for FailingConnector {
    fn open(&self, _params: &ConnectionParams) -> StorageResult<Box<dyn HashStore>> {
        self.calls.lock().push(Instant::now());
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_connector_records_each_attempt() {
        let failing = FailingConnector::refusing();
        let params = ConnectionParams::local(0);
        assert!(failing.open(&params).is_err());
        assert!(failing.open(&params).is_err());
        assert_eq!(failing.attempts(), 2);
        let times = failing.attempt_times();
        assert!(times[0] <= times[1]);
    }
}
