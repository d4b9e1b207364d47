//! Redis-backed hash store.

use crate::backend::{ConnectionParams, Connector, HashStore};
use crate::error::StorageResult;
use redis::{Commands, IntoConnectionInfo};
use std::collections::BTreeMap;
use std::time::Duration;

/// Connector for a real Redis-compatible server.
///
/// Opens a fresh TCP connection per call; pooling is left to the server.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

impl RedisConnector {
    /// Creates a new connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

impl Connector for RedisConnector {
    fn open(&self, params: &ConnectionParams) -> StorageResult<Box<dyn HashStore>> {
        let mut info = (params.host.clone(), params.port).into_connection_info()?;
        info.redis.db = i64::from(params.db);
        info.redis.password = params.password.clone();

        let client = redis::Client::open(info)?;
        let conn = match non_zero(params.connect_timeout) {
            Some(timeout) => client.get_connection_with_timeout(timeout)?,
            None => client.get_connection()?,
        };
        conn.set_read_timeout(non_zero(params.timeout))?;
        conn.set_write_timeout(non_zero(params.timeout))?;

        tracing::debug!(host = %params.host, port = params.port, db = params.db, "opened redis connection");
        Ok(Box::new(RedisStore { conn }))
    }
}

/// A handle to one logical database on a Redis server.
pub struct RedisStore {
    conn: redis::Connection,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl HashStore for RedisStore {
    fn ping(&mut self) -> StorageResult<()> {
        redis::cmd("PING").query::<String>(&mut self.conn)?;
        Ok(())
    }

    fn exists(&mut self, key: &str) -> StorageResult<bool> {
        Ok(self.conn.exists::<_, bool>(key)?)
    }

    fn hset(&mut self, key: &str, fields: &[(String, String)]) -> StorageResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.conn.hset_multiple::<_, _, _, ()>(key, fields)?;
        Ok(())
    }

    fn hget(&mut self, key: &str, field: &str) -> StorageResult<Option<String>> {
        Ok(self.conn.hget::<_, _, Option<String>>(key, field)?)
    }

    fn hgetall(&mut self, key: &str) -> StorageResult<BTreeMap<String, String>> {
        Ok(self.conn.hgetall::<_, BTreeMap<String, String>>(key)?)
    }

    fn scan(&mut self, pattern: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self.conn.scan_match::<_, String>(pattern)?.collect();
        // SCAN may return a key more than once while the keyspace is rehashing.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn del(&mut self, key: &str) -> StorageResult<bool> {
        Ok(self.conn.del::<_, u64>(key)? > 0)
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
        Ok(self.conn.pexpire::<_, bool>(key, millis)?)
    }

    fn dbsize(&mut self) -> StorageResult<u64> {
        Ok(redis::cmd("DBSIZE").query::<u64>(&mut self.conn)?)
    }

    fn flush_db(&mut self) -> StorageResult<()> {
        redis::cmd("FLUSHDB").query::<()>(&mut self.conn)?;
        Ok(())
    }
}
