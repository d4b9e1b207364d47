//! # hashrec core
//!
//! A small object mapper that stores typed records as hashes in a Redis-style
//! key-value server.
//!
//! A [`Schema`] declares the fields of a model, its table and logical
//! database, and the foreign keys it holds. [`Record`]s are built against a
//! schema and persisted through a [`Database`]:
//!
//! - every stored record carries a content digest, checked on each read
//! - records linking to others register themselves on the linked record, so
//!   deletes can `cascade` or be `restrict`ed
//! - connections are retried a bounded number of times
//! - a testing switch routes everything to an in-memory server
//!
//! ## Keys
//!
//! A record lives under `{prefix}{sep}{table}{sep}{id}`; with default
//! settings, `hashrec:user:42`.
//!
//! ## Example
//!
//! ```
//! use hashrec_core::{CorruptionPolicy, Database, FieldType, Record, Schema, Settings};
//! use std::sync::Arc;
//!
//! let settings = Arc::new(Settings::new().testing(true));
//! let users = Schema::builder("User")
//!     .db("tests")
//!     .settings(Arc::clone(&settings))
//!     .field("id", FieldType::Int)
//!     .field("name", FieldType::Str)
//!     .build()
//!     .unwrap();
//!
//! let db = Database::new();
//! let mut alice = Record::builder(&users).set("name", "alice").build().unwrap();
//! db.add(&mut alice, false).unwrap();
//! assert_eq!(alice.key().as_deref(), Some("hashrec:user:0"));
//!
//! let found = db
//!     .get(&users, CorruptionPolicy::Flag)
//!     .unwrap()
//!     .filter_by([("name", "alice")])
//!     .unwrap();
//! assert_eq!(found.count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod connection;
mod database;
mod error;
mod identity;
mod integrity;
mod query;
mod record;
mod references;
mod schema;
mod types;

pub use codec::RecordCodec;
pub use config::{DbSelector, HashAlgorithm, RetryPolicy, Settings};
pub use connection::{ConnectionManager, ConnectionStats, RETRY_DELAY};
pub use database::{Database, Target};
pub use error::{CoreError, CoreResult, ForeignKeyViolation};
pub use identity::id_for_position;
pub use integrity::{is_reserved, stamp, verify, Verification, BACK_REFERENCES_FIELD, DIGEST_FIELD};
pub use query::{Filtered, QueryResultSet};
pub use record::{Record, RecordBuilder};
pub use references::BackReference;
pub use schema::{FieldDefault, FieldDescriptor, ForeignKeyLink, Schema, SchemaBuilder};
pub use types::{CorruptionPolicy, ForeignKeyAction, RecordState, RecordStatus, ResetScope};

pub use hashrec_codec::{FieldType, Json, Value};
