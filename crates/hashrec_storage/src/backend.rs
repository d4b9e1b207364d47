//! Hash store trait definitions.

use crate::error::StorageResult;
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything a [`Connector`] needs to open one logical database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional password sent on connect.
    pub password: Option<String>,
    /// Logical database index.
    pub db: u32,
    /// Socket read/write timeout. Zero disables the timeout.
    pub timeout: Duration,
    /// Timeout for establishing the connection. Zero disables the timeout.
    pub connect_timeout: Duration,
}

impl ConnectionParams {
    /// Parameters for a password-less server on `localhost:6379`.
    #[must_use]
    pub fn local(db: u32) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// A handle to one logical database of a hash-oriented key-value server.
///
/// Every key holds a flat map of string fields to string values. All
/// operations are blocking. Handles are not shared between threads; open one
/// per caller.
///
/// # Invariants
///
/// - `hset` merges fields into the existing map and creates the key if needed
/// - `hgetall` on a missing key returns an empty map
/// - `scan` returns every live key matching the glob pattern exactly once
/// - expired keys behave exactly like missing keys
pub trait HashStore: Send {
    /// Checks that the server answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached.
    fn ping(&mut self) -> StorageResult<()>;

    /// Returns true if `key` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn exists(&mut self, key: &str) -> StorageResult<bool>;

    /// Sets the given fields on the hash at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn hset(&mut self, key: &str, fields: &[(String, String)]) -> StorageResult<()>;

    /// Reads a single field of the hash at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn hget(&mut self, key: &str, field: &str) -> StorageResult<Option<String>>;

    /// Reads every field of the hash at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn hgetall(&mut self, key: &str) -> StorageResult<BTreeMap<String, String>>;

    /// Returns all keys matching a glob `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn scan(&mut self, pattern: &str) -> StorageResult<Vec<String>>;

    /// Removes `key`. Returns true if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn del(&mut self, key: &str) -> StorageResult<bool>;

    /// Sets a time-to-live on `key`. Returns false if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn expire(&mut self, key: &str, ttl: Duration) -> StorageResult<bool>;

    /// Returns the number of keys in this logical database.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn dbsize(&mut self) -> StorageResult<u64>;

    /// Removes every key of this logical database.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn flush_db(&mut self) -> StorageResult<()>;
}

/// Opens [`HashStore`] handles.
///
/// A connector does not retry; retry policy belongs to the caller.
pub trait Connector: Send + Sync {
    /// Opens a handle to the logical database named in `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn open(&self, params: &ConnectionParams) -> StorageResult<Box<dyn HashStore>>;
}
