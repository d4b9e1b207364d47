//! The persistence API: add, exists, get, delete, count and reset.

use crate::codec::RecordCodec;
use crate::config::{DbSelector, Settings};
use crate::connection::ConnectionManager;
use crate::error::{CoreError, CoreResult};
use crate::identity;
use crate::integrity::{self, DIGEST_FIELD};
use crate::query::QueryResultSet;
use crate::record::{coerce_id, Record};
use crate::references::{self, DeletePlanner, PlannedDelete};
use crate::schema::Schema;
use crate::types::{CorruptionPolicy, RecordState, ResetScope};
use hashrec_codec::Value;
use hashrec_storage::{HashStore, DATABASE_COUNT};
use std::sync::Arc;
use std::time::Duration;

/// What `exists` and `delete` address: a whole schema or one record.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A schema; ids must be given explicitly.
    Schema(&'a Arc<Schema>),
    /// A record; its id is used when none is given.
    Record(&'a Record),
}

impl<'a> Target<'a> {
    fn schema(&self) -> &'a Arc<Schema> {
        match self {
            Target::Schema(schema) => schema,
            Target::Record(record) => record.schema(),
        }
    }

    fn own_id(&self) -> Option<&'a Value> {
        match self {
            Target::Schema(_) => None,
            Target::Record(record) => record.id(),
        }
    }
}

impl<'a> From<&'a Arc<Schema>> for Target<'a> {
    fn from(schema: &'a Arc<Schema>) -> Self {
        Target::Schema(schema)
    }
}

impl<'a> From<&'a Record> for Target<'a> {
    fn from(record: &'a Record) -> Self {
        Target::Record(record)
    }
}

/// Entry point for reading and writing records.
///
/// Cloning is cheap; clones share the [`ConnectionManager`] and therefore the
/// in-memory fake servers.
///
/// ```
/// use hashrec_core::{CorruptionPolicy, Database, FieldType, Record, Schema, Settings};
/// use std::sync::Arc;
///
/// let settings = Arc::new(Settings::new().testing(true));
/// let notes = Schema::builder("Note")
///     .db(0)
///     .settings(Arc::clone(&settings))
///     .field("id", FieldType::Int)
///     .field("text", FieldType::Str)
///     .build()
///     .unwrap();
///
/// let db = Database::new();
/// let mut note = Record::builder(&notes).set("text", "hello").build().unwrap();
/// db.add(&mut note, false).unwrap();
///
/// let all = db.get(&notes, CorruptionPolicy::Flag).unwrap();
/// assert_eq!(all.len(), 1);
/// assert_eq!(db.count(0, &settings).unwrap(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Database {
    connections: Arc<ConnectionManager>,
}

impl Database {
    /// Creates a database facade with its own connection manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database facade over an existing connection manager.
    #[must_use]
    pub fn with_connections(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// The connection manager.
    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    fn open(&self, schema: &Schema) -> CoreResult<Box<dyn HashStore>> {
        self.connections
            .connect(schema.db(), schema.settings(), schema.testing())
    }

    /// Writes `record`.
    ///
    /// Assigns a pending automatic id, registers the record on every record
    /// it links to, then writes its fields and digest. The stored
    /// back-references of an existing record are kept. When an update moves
    /// a link, the entry on the previously linked record is removed.
    ///
    /// On error `record` is left as it was, id included.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotInstantiated`] for a placeholder
    /// - [`CoreError::AlreadyExists`] if the key is taken and `exists_ok` is false
    /// - [`CoreError::InvalidExpire`] for a non-positive or non-finite expiry
    /// - [`CoreError::ForeignKey`] if a linked record is missing or on another server
    pub fn add(&self, record: &mut Record, exists_ok: bool) -> CoreResult<()> {
        let schema = Arc::clone(record.schema());
        if record.state() == RecordState::Placeholder {
            return Err(CoreError::NotInstantiated {
                table: schema.table().to_string(),
            });
        }
        let ttl = match schema.expire() {
            Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
                Some(Duration::try_from_secs_f64(seconds).map_err(|_| CoreError::InvalidExpire {
                    table: schema.table().to_string(),
                    seconds,
                })?)
            }
            Some(seconds) => {
                return Err(CoreError::InvalidExpire {
                    table: schema.table().to_string(),
                    seconds,
                })
            }
            None => None,
        };

        let mut store = self.open(&schema)?;
        // Work on a copy so a failed add leaves `record` untouched.
        let mut staged = record.clone();
        if staged.id().is_none() {
            staged.assign_id(identity::next_id(store.as_mut(), &schema)?);
        }
        let Some(id) = staged.id().cloned() else {
            return Err(CoreError::NoIdentifier {
                table: schema.table().to_string(),
            });
        };
        let key = schema.key(&id);

        let previous = if store.exists(&key)? {
            if !exists_ok {
                return Err(CoreError::AlreadyExists { key });
            }
            Some(store.hgetall(&key)?)
        } else {
            None
        };

        let fields = RecordCodec::encode(&staged)?;
        references::attach(&self.connections, &staged, &key)?;
        if let Some(previous) = &previous {
            references::detach_moved(&self.connections, &staged, &key, previous, &fields)?;
        }

        let digest = integrity::stamp(&key, &fields, schema.settings().hash_algorithm);
        let mut pairs: Vec<(String, String)> = fields.into_iter().collect();
        pairs.push((DIGEST_FIELD.to_string(), digest.clone()));
        store.hset(&key, &pairs)?;

        if let Some(ttl) = ttl {
            store.expire(&key, ttl)?;
        }
        *record = staged;
        record.mark_persisted(digest);
        tracing::debug!(%key, exists_ok, "record added");
        Ok(())
    }

    /// Returns true if the addressed record is stored.
    ///
    /// `id` overrides the id of a record target.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoIdentifier`] if no id is available and
    /// [`CoreError::TypeMismatch`] if `id` does not fit the id type.
    pub fn exists<'a>(&self, target: impl Into<Target<'a>>, id: Option<Value>) -> CoreResult<bool> {
        let target = target.into();
        let schema = target.schema();
        let id = match id.or_else(|| target.own_id().cloned()) {
            Some(id) => coerce_id(schema, id)?,
            None => {
                return Err(CoreError::NoIdentifier {
                    table: schema.table().to_string(),
                })
            }
        };
        let mut store = self.open(schema)?;
        Ok(store.exists(&schema.key(&id))?)
    }

    /// Fetches every record of `schema`, ordered by id.
    ///
    /// Each record's digest is verified and `policy` decides what happens to
    /// those that fail.
    ///
    /// # Errors
    ///
    /// Returns connection and storage errors.
    pub fn get(&self, schema: &Arc<Schema>, policy: CorruptionPolicy) -> CoreResult<QueryResultSet> {
        let mut store = self.open(schema)?;
        let algorithm = schema.settings().hash_algorithm;
        let mut records = Vec::new();

        for key in store.scan(&schema.scan_pattern())? {
            let Some(id) = schema.id_from_key(&key) else {
                continue;
            };
            let raw = store.hgetall(&key)?;
            if raw.is_empty() {
                // expired or removed since the scan
                continue;
            }
            let verification = integrity::verify(&key, &raw, algorithm);
            let record = RecordCodec::decode(schema, id, &raw);
            match integrity::apply_policy(record, verification, policy) {
                Some(record) => records.push(record),
                None => tracing::warn!(%key, ?verification, "skipped corrupt record"),
            }
            if !verification.is_valid() && policy != CorruptionPolicy::Skip {
                tracing::warn!(%key, ?verification, %policy, "corrupt record");
            }
        }

        records.sort_by(|a, b| match (a.id(), b.id()) {
            (Some(x), Some(y)) => x.cmp_natural(y),
            (x, y) => x.is_none().cmp(&y.is_none()),
        });
        tracing::debug!(table = schema.table(), count = records.len(), %policy, "records fetched");
        QueryResultSet::new(Arc::clone(schema), records)
    }

    /// Deletes records, following back-references.
    ///
    /// With no `ids`, deletes the record target itself. Ids are processed in
    /// order and an error stops the batch; earlier deletions stay done.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NoIdentifier`] if no id is given for a schema target
    /// - [`CoreError::NoSuchRecord`] for a missing id unless `non_existent_ok`
    /// - [`CoreError::ForeignKey`] if a `restrict` link blocks the delete
    pub fn delete<'a>(
        &self,
        target: impl Into<Target<'a>>,
        ids: &[Value],
        non_existent_ok: bool,
    ) -> CoreResult<()> {
        let target = target.into();
        let schema = target.schema();
        let ids: Vec<Value> = if ids.is_empty() {
            match target.own_id() {
                Some(id) => vec![id.clone()],
                None => {
                    return Err(CoreError::NoIdentifier {
                        table: schema.table().to_string(),
                    })
                }
            }
        } else {
            ids.to_vec()
        };

        for id in ids {
            self.delete_one(schema, id, non_existent_ok)?;
        }
        Ok(())
    }

    /// Deletes `record` and marks it [`RecordState::Deleted`].
    ///
    /// # Errors
    ///
    /// See [`Database::delete`].
    pub fn delete_record(&self, record: &mut Record, non_existent_ok: bool) -> CoreResult<()> {
        self.delete(&*record, &[], non_existent_ok)?;
        record.mark_deleted();
        Ok(())
    }

    fn delete_one(&self, schema: &Arc<Schema>, id: Value, non_existent_ok: bool) -> CoreResult<()> {
        let id = coerce_id(schema, id)?;
        let key = schema.key(&id);
        if !self.open(schema)?.exists(&key)? {
            if non_existent_ok {
                tracing::debug!(%key, "nothing to delete");
                return Ok(());
            }
            return Err(CoreError::NoSuchRecord { key });
        }

        let mut planner = DeletePlanner::new(&self.connections, schema.settings(), schema.testing());
        planner.plan(PlannedDelete {
            db: schema.db(),
            key,
            table: schema.table().to_string(),
            id: id.to_string(),
        })?;
        let removed = planner.apply()?;
        tracing::debug!(table = schema.table(), %id, removed = removed.len(), "record deleted");
        Ok(())
    }

    /// Number of keys in a logical database, across all tables.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownDatabase`] for an unknown name, plus connection
    /// and storage errors.
    pub fn count(&self, db: impl Into<DbSelector>, settings: &Settings) -> CoreResult<u64> {
        let db = db.into().resolve(settings)?;
        let mut store = self.connections.connect(db, settings, settings.testing)?;
        Ok(store.dbsize()?)
    }

    /// Removes every key from the databases in `scope`.
    ///
    /// # Errors
    ///
    /// For [`ResetScope::Databases`], the first failure. [`ResetScope::All`]
    /// logs failures and carries on.
    pub fn reset(&self, scope: ResetScope, settings: &Settings) -> CoreResult<()> {
        match scope {
            ResetScope::All => {
                for db in 0..DATABASE_COUNT {
                    if let Err(err) = self.flush(db, settings) {
                        tracing::warn!(db, error = %err, "reset failed, continuing");
                    }
                }
            }
            ResetScope::Databases(dbs) => {
                for db in dbs {
                    self.flush(db, settings)?;
                }
            }
        }
        Ok(())
    }

    fn flush(&self, db: u32, settings: &Settings) -> CoreResult<()> {
        let mut store = self.connections.connect(db, settings, settings.testing)?;
        store.flush_db()?;
        tracing::info!(db, "database reset");
        Ok(())
    }
}
