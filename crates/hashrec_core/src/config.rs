//! Connection and key-layout settings.

use crate::error::{CoreError, CoreResult};
use hashrec_storage::{ConnectionParams, DATABASE_COUNT};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Hash function used for content digests and hashed ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5 (32 hex chars).
    #[default]
    Md5,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
    /// BLAKE3.
    Blake3,
}

impl HashAlgorithm {
    /// Returns the lowercase hex digest of `data`.
    #[must_use]
    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => hex::encode(md5::Md5::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    /// Returns the configuration name of the algorithm.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(CoreError::invalid_settings(format!(
                "unknown hash algorithm {other:?}"
            ))),
        }
    }
}

/// Connection retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Whether failed connection attempts are retried.
    pub enabled: bool,
    /// Total number of attempts when enabled.
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            attempts: 1,
        }
    }

    /// Number of attempts actually made (at least one).
    #[must_use]
    pub const fn effective_attempts(&self) -> u32 {
        if self.enabled && self.attempts > 1 {
            self.attempts
        } else {
            1
        }
    }
}

/// A logical database given by index or by configured name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbSelector {
    /// Numeric index.
    Index(u32),
    /// Name resolved through [`Settings::db_index`].
    Name(String),
}

impl DbSelector {
    /// Resolves the selector to a numeric index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownDatabase`] for an unknown name and
    /// [`CoreError::InvalidSettings`] for an index out of range.
    pub fn resolve(&self, settings: &Settings) -> CoreResult<u32> {
        match self {
            DbSelector::Index(index) => check_index(*index).map(|()| *index),
            DbSelector::Name(name) => settings.db_index(name),
        }
    }
}

impl From<u32> for DbSelector {
    fn from(index: u32) -> Self {
        DbSelector::Index(index)
    }
}

impl From<&str> for DbSelector {
    fn from(name: &str) -> Self {
        DbSelector::Name(name.to_string())
    }
}

impl From<String> for DbSelector {
    fn from(name: String) -> Self {
        DbSelector::Name(name)
    }
}

fn check_index(index: u32) -> CoreResult<()> {
    if index < DATABASE_COUNT {
        Ok(())
    } else {
        Err(CoreError::invalid_settings(format!(
            "database index {index} is out of range (0..{DATABASE_COUNT})"
        )))
    }
}

/// Settings shared by every schema bound to one server.
///
/// Schemas hold an `Arc<Settings>`; there is no process-wide instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional server password.
    pub password: Option<String>,
    /// Socket read/write timeout.
    pub timeout: Duration,
    /// Connection retry policy.
    pub retry: RetryPolicy,
    /// Upper bound on simultaneous connections to the server.
    pub max_connections: u32,
    /// Timeout for establishing a connection.
    pub blocking_timeout: Duration,
    /// Separator between key segments.
    pub separator: String,
    /// First key segment.
    pub prefix: String,
    /// Algorithm for digests and hashed ids.
    pub hash_algorithm: HashAlgorithm,
    /// Route every connection to the in-memory fake server.
    pub testing: bool,
    dbnames: BTreeMap<String, u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            max_connections: 10,
            blocking_timeout: Duration::from_secs(3),
            separator: ":".to_string(),
            prefix: "hashrec".to_string(),
            hash_algorithm: HashAlgorithm::Md5,
            testing: false,
            dbnames: default_dbnames(),
        }
    }
}

fn default_dbnames() -> BTreeMap<String, u32> {
    BTreeMap::from([("tests".to_string(), 15)])
}

impl Settings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the server password.
    #[must_use]
    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Sets the socket timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the connection limit.
    #[must_use]
    pub const fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    /// Sets the key separator.
    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the hash algorithm.
    #[must_use]
    pub const fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Routes connections to the in-memory fake server.
    #[must_use]
    pub const fn testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    /// Returns the index bound to a database name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownDatabase`] if no index carries `name`.
    pub fn db_index(&self, name: &str) -> CoreResult<u32> {
        self.dbnames
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::UnknownDatabase {
                name: name.to_string(),
            })
    }

    /// Binds `name` to logical database `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseNameTaken`] if `name` is bound and
    /// `overwrite` is false, and [`CoreError::InvalidSettings`] if `index` is
    /// out of range.
    pub fn name_database(
        &mut self,
        name: impl Into<String>,
        index: u32,
        overwrite: bool,
    ) -> CoreResult<()> {
        check_index(index)?;
        let name = name.into();
        if let Some(&bound) = self.dbnames.get(&name) {
            if !overwrite && bound != index {
                return Err(CoreError::DatabaseNameTaken { name, index: bound });
            }
        }
        self.dbnames.insert(name, index);
        Ok(())
    }

    /// Returns every database name and its index.
    pub fn database_names(&self) -> impl Iterator<Item = (&str, u32)> {
        self.dbnames.iter().map(|(name, index)| (name.as_str(), *index))
    }

    /// Connection parameters for logical database `db`.
    #[must_use]
    pub fn connection_params(&self, db: u32) -> ConnectionParams {
        ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            db,
            timeout: self.timeout,
            connect_timeout: self.blocking_timeout,
        }
    }

    /// Names the connection parameters that differ from `other`.
    ///
    /// Empty when both point at the same server with the same credentials.
    #[must_use]
    pub fn connection_differences(&self, other: &Settings) -> Vec<&'static str> {
        let mut differences = Vec::new();
        if self.host != other.host {
            differences.push("host");
        }
        if self.port != other.port {
            differences.push("port");
        }
        if self.password != other.password {
            differences.push("password");
        }
        differences
    }

    /// Parses settings from the sectioned JSON layout.
    ///
    /// ```json
    /// {
    ///   "network": {"host": "localhost", "port": 6379, "password": null},
    ///   "connection": {"timeout": 30, "retry_on_timeout": [true, 3]},
    ///   "pools": {"max_connections": 10, "blocking_timeout": 3},
    ///   "structure": {"separator": ":", "prefix": "app", "hash_algorithm": "md5"},
    ///   "dbnames": {"tests": 15},
    ///   "tests": {"use_tests": false}
    /// }
    /// ```
    ///
    /// Missing sections and keys keep their default values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSettings`] on malformed JSON or out of
    /// range values.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let file: SettingsFile = serde_json::from_str(json)
            .map_err(|e| CoreError::invalid_settings(e.to_string()))?;
        file.into_settings()
    }

    /// Reads settings from a JSON file (see [`Settings::from_json_str`]).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the file cannot be read and
    /// [`CoreError::InvalidSettings`] if its content is rejected.
    pub fn from_json_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SettingsFile {
    network: NetworkSection,
    connection: ConnectionSection,
    pools: PoolsSection,
    structure: StructureSection,
    dbnames: BTreeMap<String, u32>,
    tests: TestsSection,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            network: NetworkSection::default(),
            connection: ConnectionSection::default(),
            pools: PoolsSection::default(),
            structure: StructureSection::default(),
            dbnames: default_dbnames(),
            tests: TestsSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct NetworkSection {
    host: String,
    port: u16,
    password: Option<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ConnectionSection {
    timeout: f64,
    retry_on_timeout: (bool, u32),
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            timeout: 30.0,
            retry_on_timeout: (true, 3),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PoolsSection {
    max_connections: u32,
    blocking_timeout: f64,
}

impl Default for PoolsSection {
    fn default() -> Self {
        Self {
            max_connections: 10,
            blocking_timeout: 3.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StructureSection {
    separator: String,
    prefix: String,
    hash_algorithm: HashAlgorithm,
}

impl Default for StructureSection {
    fn default() -> Self {
        Self {
            separator: ":".to_string(),
            prefix: "hashrec".to_string(),
            hash_algorithm: HashAlgorithm::Md5,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TestsSection {
    use_tests: bool,
}

fn seconds(name: &str, value: f64) -> CoreResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CoreError::invalid_settings(format!("{name} must be a non-negative number of seconds, got {value}")))
}

impl SettingsFile {
    fn into_settings(self) -> CoreResult<Settings> {
        if self.structure.separator.is_empty() {
            return Err(CoreError::invalid_settings("separator must not be empty"));
        }
        for index in self.dbnames.values() {
            check_index(*index)?;
        }
        let (enabled, attempts) = self.connection.retry_on_timeout;
        Ok(Settings {
            host: self.network.host,
            port: self.network.port,
            password: self.network.password.filter(|p| !p.is_empty()),
            timeout: seconds("timeout", self.connection.timeout)?,
            retry: RetryPolicy { enabled, attempts },
            max_connections: self.pools.max_connections,
            blocking_timeout: seconds("blocking_timeout", self.pools.blocking_timeout)?,
            separator: self.structure.separator,
            prefix: self.structure.prefix,
            hash_algorithm: self.structure.hash_algorithm,
            testing: self.tests.use_tests,
            dbnames: self.dbnames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 6379);
        assert_eq!(settings.password, None);
        assert_eq!(settings.retry, RetryPolicy { enabled: true, attempts: 3 });
        assert_eq!(settings.separator, ":");
        assert_eq!(settings.hash_algorithm, HashAlgorithm::Md5);
        assert_eq!(settings.db_index("tests").unwrap(), 15);
        assert!(!settings.testing);
    }

    #[test]
    fn builder_pattern() {
        let settings = Settings::new()
            .host("db.internal")
            .port(7000)
            .prefix("shop")
            .hash_algorithm(HashAlgorithm::Sha256)
            .retry(RetryPolicy::disabled())
            .testing(true);

        assert_eq!(settings.host, "db.internal");
        assert_eq!(settings.port, 7000);
        assert_eq!(settings.prefix, "shop");
        assert_eq!(settings.retry.effective_attempts(), 1);
        assert!(settings.testing);
    }

    #[test]
    fn effective_attempts_is_at_least_one() {
        let zero = RetryPolicy {
            enabled: true,
            attempts: 0,
        };
        assert_eq!(zero.effective_attempts(), 1);
        let off = RetryPolicy {
            enabled: false,
            attempts: 5,
        };
        assert_eq!(off.effective_attempts(), 1);
        assert_eq!(RetryPolicy::default().effective_attempts(), 3);
    }

    #[test]
    fn unknown_database_name() {
        let settings = Settings::default();
        assert!(matches!(
            settings.db_index("nope"),
            Err(CoreError::UnknownDatabase { name }) if name == "nope"
        ));
    }

    #[test]
    fn naming_databases_detects_conflicts() {
        let mut settings = Settings::default();
        settings.name_database("users", 2, false).unwrap();
        assert_eq!(settings.db_index("users").unwrap(), 2);

        // rebinding to the same index is a no-op
        settings.name_database("users", 2, false).unwrap();

        assert!(matches!(
            settings.name_database("users", 3, false),
            Err(CoreError::DatabaseNameTaken { index: 2, .. })
        ));
        settings.name_database("users", 3, true).unwrap();
        assert_eq!(settings.db_index("users").unwrap(), 3);

        assert!(matches!(
            settings.name_database("big", 16, false),
            Err(CoreError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn selector_resolution() {
        let settings = Settings::default();
        assert_eq!(DbSelector::from(4).resolve(&settings).unwrap(), 4);
        assert_eq!(DbSelector::from("tests").resolve(&settings).unwrap(), 15);
        assert!(DbSelector::from(99).resolve(&settings).is_err());
    }

    #[test]
    fn connection_differences_lists_parameters() {
        let a = Settings::default();
        let b = Settings::default().port(7000).password(Some("pw".into()));
        assert!(a.connection_differences(&a.clone()).is_empty());
        assert_eq!(a.connection_differences(&b), vec!["port", "password"]);
    }

    #[test]
    fn parse_sectioned_json() {
        let settings = Settings::from_json_str(
            r#"{
                "envfile": null,
                "network": {"host": "cache", "port": 6380, "password": ""},
                "connection": {"decode_response": true, "timeout": 1.5, "retry_on_timeout": [false, 7]},
                "pools": {"max_connections": 4, "blocking_timeout": 2},
                "structure": {"separator": "/", "prefix": "shop", "hash_algorithm": "sha512"},
                "dbnames": {"users": 1, "orders": 2},
                "tests": {"use_tests": true, "db": "tests", "restart_db": true}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.host, "cache");
        assert_eq!(settings.port, 6380);
        assert_eq!(settings.password, None);
        assert_eq!(settings.timeout, Duration::from_millis(1500));
        assert_eq!(settings.retry, RetryPolicy { enabled: false, attempts: 7 });
        assert_eq!(settings.max_connections, 4);
        assert_eq!(settings.blocking_timeout, Duration::from_secs(2));
        assert_eq!(settings.separator, "/");
        assert_eq!(settings.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(settings.db_index("orders").unwrap(), 2);
        assert!(settings.db_index("tests").is_err());
        assert!(settings.testing);
    }

    #[test]
    fn empty_json_gives_defaults() {
        assert_eq!(Settings::from_json_str("{}").unwrap(), Settings::default());
    }

    #[test]
    fn json_rejects_bad_values() {
        assert!(Settings::from_json_str(r#"{"connection": {"timeout": -1}}"#).is_err());
        assert!(Settings::from_json_str(r#"{"dbnames": {"x": 40}}"#).is_err());
        assert!(Settings::from_json_str(r#"{"structure": {"hash_algorithm": "crc"}}"#).is_err());
        assert!(Settings::from_json_str("not json").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"structure": {{"prefix": "fromfile"}}}}"#).unwrap();
        let settings = Settings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.prefix, "fromfile");

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            Settings::from_json_file(missing),
            Err(CoreError::Io(_))
        ));
    }

    #[test]
    fn hash_algorithms() {
        assert_eq!(
            HashAlgorithm::Md5.hex_digest(b"0"),
            "cfcd208495d565ef66e7dff9f98764da"
        );
        assert_eq!(HashAlgorithm::Sha256.hex_digest(b"").len(), 64);
        assert_eq!(HashAlgorithm::Sha512.hex_digest(b"").len(), 128);
        assert_eq!(HashAlgorithm::Blake3.hex_digest(b"").len(), 64);
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }
}
