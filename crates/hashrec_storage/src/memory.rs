//! In-process fake server for tests.

use crate::backend::{ConnectionParams, Connector, HashStore};
use crate::error::{StorageError, StorageResult};
use crate::pattern::glob_match;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of logical databases a server exposes (indexes `0..16`).
pub const DATABASE_COUNT: u32 = 16;

#[derive(Debug, Clone, Default)]
struct Entry {
    fields: BTreeMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type Keyspace = HashMap<String, Entry>;

/// An in-memory server holding [`DATABASE_COUNT`] logical databases.
///
/// Every [`MemoryStore`] opened against the same server sees the same data,
/// which mirrors several clients talking to one real server.
///
/// Cloning yields another handle to the same data.
///
/// # Thread Safety
///
/// The server is thread-safe; stores opened from it can live on different
/// threads.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    databases: Arc<RwLock<HashMap<u32, Keyspace>>>,
}

impl MemoryServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store for logical database `db`.
    ///
    /// # Errors
    ///
    /// Returns an error if `db` is out of range.
    pub fn store(&self, db: u32) -> StorageResult<MemoryStore> {
        if db >= DATABASE_COUNT {
            return Err(StorageError::backend(format!(
                "DB index is out of range: {db}"
            )));
        }
        Ok(MemoryStore {
            server: self.clone(),
            db,
        })
    }

    /// Returns the number of live keys across every logical database.
    #[must_use]
    pub fn total_keys(&self) -> usize {
        let now = Instant::now();
        self.databases
            .read()
            .values()
            .map(|keyspace| keyspace.values().filter(|e| e.is_live(now)).count())
            .sum()
    }

    fn read<T>(&self, db: u32, f: impl FnOnce(Option<&Keyspace>, Instant) -> T) -> T {
        let databases = self.databases.read();
        f(databases.get(&db), Instant::now())
    }

    fn write<T>(&self, db: u32, f: impl FnOnce(&mut Keyspace, Instant) -> T) -> T {
        let mut databases = self.databases.write();
        let keyspace = databases.entry(db).or_default();
        let now = Instant::now();
        keyspace.retain(|_, entry| entry.is_live(now));
        f(keyspace, now)
    }
}

/// A handle to one logical database of a [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    server: MemoryServer,
    db: u32,
}

impl MemoryStore {
    /// Returns the logical database this handle is bound to.
    #[must_use]
    pub fn db(&self) -> u32 {
        self.db
    }
}

impl HashStore for MemoryStore {
    fn ping(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn exists(&mut self, key: &str) -> StorageResult<bool> {
        Ok(self.server.read(self.db, |keyspace, now| {
            keyspace
                .and_then(|k| k.get(key))
                .is_some_and(|entry| entry.is_live(now))
        }))
    }

    fn hset(&mut self, key: &str, fields: &[(String, String)]) -> StorageResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.server.write(self.db, |keyspace, _| {
            let entry = keyspace.entry(key.to_string()).or_default();
            for (field, value) in fields {
                entry.fields.insert(field.clone(), value.clone());
            }
        });
        Ok(())
    }

    fn hget(&mut self, key: &str, field: &str) -> StorageResult<Option<String>> {
        Ok(self.server.read(self.db, |keyspace, now| {
            keyspace
                .and_then(|k| k.get(key))
                .filter(|entry| entry.is_live(now))
                .and_then(|entry| entry.fields.get(field).cloned())
        }))
    }

    fn hgetall(&mut self, key: &str) -> StorageResult<BTreeMap<String, String>> {
        Ok(self.server.read(self.db, |keyspace, now| {
            keyspace
                .and_then(|k| k.get(key))
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.fields.clone())
                .unwrap_or_default()
        }))
    }

    fn scan(&mut self, pattern: &str) -> StorageResult<Vec<String>> {
        Ok(self.server.read(self.db, |keyspace, now| {
            keyspace
                .map(|k| {
                    k.iter()
                        .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
                        .map(|(key, _)| key.clone())
                        .collect()
                })
                .unwrap_or_default()
        }))
    }

    fn del(&mut self, key: &str) -> StorageResult<bool> {
        Ok(self
            .server
            .write(self.db, |keyspace, _| keyspace.remove(key).is_some()))
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> StorageResult<bool> {
        Ok(self.server.write(self.db, |keyspace, now| {
            match keyspace.get_mut(key) {
                Some(entry) => {
                    entry.expires_at = Some(now + ttl);
                    true
                }
                None => false,
            }
        }))
    }

    fn dbsize(&mut self) -> StorageResult<u64> {
        Ok(self.server.read(self.db, |keyspace, now| {
            keyspace.map_or(0, |k| k.values().filter(|e| e.is_live(now)).count() as u64)
        }))
    }

    fn flush_db(&mut self) -> StorageResult<()> {
        self.server.write(self.db, |keyspace, _| keyspace.clear());
        Ok(())
    }
}

/// Connector that hands out [`MemoryStore`]s.
///
/// One [`MemoryServer`] is kept per `host:port`, so two opens with the same
/// address share data while different addresses stay isolated.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    servers: Mutex<HashMap<(String, u16), MemoryServer>>,
}

impl MemoryConnector {
    /// Creates a connector with no servers yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the server for `host:port`, creating it on first use.
    #[must_use]
    pub fn server(&self, host: &str, port: u16) -> MemoryServer {
        self.servers
            .lock()
            .entry((host.to_string(), port))
            .or_default()
            .clone()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, params: &ConnectionParams) -> StorageResult<Box<dyn HashStore>> {
        let store = self.server(&params.host, params.port).store(params.db)?;
        Ok(Box::new(store))
    }
}
