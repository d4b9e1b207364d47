//! # hashrec storage
//!
//! Backend abstraction for the hashrec mapping layer.
//!
//! Backends are **flat hash stores**: a keyspace of string keys, each holding
//! a map of string fields to string values, partitioned into numbered logical
//! databases. They do not know anything about schemas, digests or foreign
//! keys.
//!
//! ## Available Backends
//!
//! - [`MemoryConnector`] - in-process fake server, used by tests
//! - [`RedisConnector`] - a real Redis-compatible server (feature `redis`)
//!
//! ## Example
//!
//! ```rust
//! use hashrec_storage::{ConnectionParams, Connector, HashStore, MemoryConnector};
//!
//! let connector = MemoryConnector::new();
//! let mut store = connector.open(&ConnectionParams::local(0)).unwrap();
//! store.hset("app:user:1", &[("name".into(), "ada".into())]).unwrap();
//! assert!(store.exists("app:user:1").unwrap());
//! assert_eq!(store.dbsize().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod pattern;
#[cfg(feature = "redis")]
mod remote;

pub use backend::{ConnectionParams, Connector, HashStore};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryConnector, MemoryServer, MemoryStore, DATABASE_COUNT};
pub use pattern::glob_match;
#[cfg(feature = "redis")]
pub use remote::{RedisConnector, RedisStore};
