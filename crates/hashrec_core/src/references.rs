//! Foreign key bookkeeping.
//!
//! A record that links to another writes a [`BackReference`] onto the
//! referenced record's [`BACK_REFERENCES_FIELD`] before it writes itself.
//! Deletes read those back-references to enforce `restrict` and to find the
//! records a `cascade` must remove.
//!
//! # Invariants
//!
//! - back-references are keyed by the referencing record's storage key
//! - an update that moves a link drops its entry from the old target
//! - a back-reference whose key no longer exists is ignored
//! - a delete removes nothing until the whole cascade is planned

use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::error::{CoreError, CoreResult, ForeignKeyViolation};
use crate::integrity::BACK_REFERENCES_FIELD;
use crate::record::Record;
use crate::types::ForeignKeyAction;
use hashrec_storage::HashStore;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One referencing record, as stored on the record it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackReference {
    /// Delete action (`cascade` or `restrict`). Kept as text so that an
    /// unknown stored action can be reported.
    pub action: String,
    /// Storage key of the referencing record.
    pub key: String,
    /// Logical database of the referencing record.
    pub db: u32,
    /// Table of the referencing record.
    pub table: String,
    /// Id of the referencing record, rendered.
    pub id: String,
    /// Id field name of the referencing record.
    pub id_field: String,
}

/// Reads a stored back-reference map. Unreadable content counts as empty.
pub(crate) fn parse_back_references(raw: Option<&str>) -> BTreeMap<String, BackReference> {
    raw.and_then(|text| serde_json::from_str(text).ok())
        .unwrap_or_default()
}

/// Records `record` (stored under `key`) on every record it links to.
///
/// # Errors
///
/// - `ConnectionMismatch` if a linked schema uses another server
/// - `ReferencedRecordMissing` if a linked record does not exist
pub(crate) fn attach(connections: &ConnectionManager, record: &Record, key: &str) -> CoreResult<()> {
    let schema = record.schema();
    let Some(id) = record.id() else {
        return Err(CoreError::NoIdentifier {
            table: schema.table().to_string(),
        });
    };

    for (index, field) in schema.fields().iter().enumerate() {
        let Some(link) = schema.link_at(index) else {
            continue;
        };
        let target = link.target();

        let differences = schema.settings().connection_differences(target.settings());
        if !differences.is_empty() {
            return Err(ForeignKeyViolation::ConnectionMismatch {
                table: schema.table().to_string(),
                referenced_table: target.table().to_string(),
                differences: differences.join(", "),
            }
            .into());
        }

        let Some(target_id) = record.value_at(index) else {
            return Err(ForeignKeyViolation::MissingReference {
                table: schema.table().to_string(),
                field: field.name().to_string(),
            }
            .into());
        };
        let target_key = target.key(target_id);
        let mut store = connections.connect(target.db(), target.settings(), target.testing())?;
        if !store.exists(&target_key)? {
            return Err(ForeignKeyViolation::ReferencedRecordMissing {
                field: field.name().to_string(),
                table: target.table().to_string(),
                id: target_id.to_string(),
            }
            .into());
        }

        let existing = store.hget(&target_key, BACK_REFERENCES_FIELD)?;
        let mut back_references = parse_back_references(existing.as_deref());
        back_references.insert(
            key.to_string(),
            BackReference {
                action: link.action().as_str().to_string(),
                key: key.to_string(),
                db: schema.db(),
                table: schema.table().to_string(),
                id: id.to_string(),
                id_field: schema.id_field().to_string(),
            },
        );
        let encoded = serde_json::to_string(&back_references)
            .map_err(hashrec_codec::CodecError::from)?;
        store.hset(&target_key, &[(BACK_REFERENCES_FIELD.to_string(), encoded)])?;
        tracing::debug!(from = key, to = %target_key, action = %link.action(), "attached back-reference");
    }
    Ok(())
}

/// Removes `key` from the records its links pointed at before an update.
///
/// `previous` holds the stored fields of `key` and `fields` the fields about
/// to be written. Links whose value did not change are left alone, as are
/// previous targets that no longer exist.
pub(crate) fn detach_moved(
    connections: &ConnectionManager,
    record: &Record,
    key: &str,
    previous: &BTreeMap<String, String>,
    fields: &BTreeMap<String, String>,
) -> CoreResult<()> {
    let schema = record.schema();
    // Targets still linked through another field keep their entry.
    let current: HashSet<String> = schema
        .links()
        .iter()
        .filter_map(|link| {
            let id = link.target().id_type().decode(fields.get(link.field())?);
            (!id.is_corrupted()).then(|| link.target().key(&id))
        })
        .collect();
    for link in schema.links() {
        let Some(old) = previous.get(link.field()) else {
            continue;
        };
        if fields.get(link.field()) == Some(old) {
            continue;
        }
        let target = link.target();
        let old_id = target.id_type().decode(old);
        if old_id.is_corrupted() {
            continue;
        }
        let target_key = target.key(&old_id);
        if current.contains(&target_key) {
            continue;
        }

        let mut store = connections.connect(target.db(), target.settings(), target.testing())?;
        let existing = store.hget(&target_key, BACK_REFERENCES_FIELD)?;
        let mut back_references = parse_back_references(existing.as_deref());
        if back_references.remove(key).is_none() || !store.exists(&target_key)? {
            continue;
        }
        let encoded = serde_json::to_string(&back_references)
            .map_err(hashrec_codec::CodecError::from)?;
        store.hset(&target_key, &[(BACK_REFERENCES_FIELD.to_string(), encoded)])?;
        tracing::debug!(from = key, to = %target_key, field = link.field(), "detached back-reference");
    }
    Ok(())
}

/// A key scheduled for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedDelete {
    pub(crate) db: u32,
    pub(crate) key: String,
    pub(crate) table: String,
    pub(crate) id: String,
}

/// Plans and applies deletes that follow back-references.
///
/// Connections are opened once per logical database and reused.
pub(crate) struct DeletePlanner<'a> {
    connections: &'a ConnectionManager,
    settings: &'a Settings,
    testing: bool,
    stores: HashMap<u32, Box<dyn HashStore>>,
    visited: HashSet<(u32, String)>,
    order: Vec<PlannedDelete>,
}

impl<'a> DeletePlanner<'a> {
    pub(crate) fn new(
        connections: &'a ConnectionManager,
        settings: &'a Settings,
        testing: bool,
    ) -> Self {
        Self {
            connections,
            settings,
            testing,
            stores: HashMap::new(),
            visited: HashSet::new(),
            order: Vec::new(),
        }
    }

    fn store(&mut self, db: u32) -> CoreResult<&mut Box<dyn HashStore>> {
        Ok(match self.stores.entry(db) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(self.connections.connect(db, self.settings, self.testing)?)
            }
        })
    }

    /// Walks the back-references below `target`.
    ///
    /// On success the plan lists dependents before the records they depend
    /// on, with `target` last.
    pub(crate) fn plan(&mut self, target: PlannedDelete) -> CoreResult<()> {
        if !self.visited.insert((target.db, target.key.clone())) {
            return Ok(());
        }

        let raw = self.store(target.db)?.hget(&target.key, BACK_REFERENCES_FIELD)?;
        for reference in parse_back_references(raw.as_deref()).into_values() {
            if !self.store(reference.db)?.exists(&reference.key)? {
                continue;
            }
            match ForeignKeyAction::parse(&reference.action) {
                Some(ForeignKeyAction::Restrict) => {
                    return Err(ForeignKeyViolation::Restricted {
                        table: target.table,
                        id: target.id,
                        referencing_table: reference.table,
                        referencing_id: reference.id,
                    }
                    .into());
                }
                Some(ForeignKeyAction::Cascade) => self.plan(PlannedDelete {
                    db: reference.db,
                    key: reference.key,
                    table: reference.table,
                    id: reference.id,
                })?,
                None => {
                    return Err(ForeignKeyViolation::InvalidAction {
                        action: reference.action,
                        key: reference.key,
                    }
                    .into());
                }
            }
        }

        self.order.push(target);
        Ok(())
    }

    /// Removes every planned key, dependents first. Returns the keys removed.
    pub(crate) fn apply(mut self) -> CoreResult<Vec<PlannedDelete>> {
        let order = std::mem::take(&mut self.order);
        let last = order.len().saturating_sub(1);
        for (position, step) in order.iter().enumerate() {
            self.store(step.db)?.del(&step.key)?;
            if position < last {
                tracing::info!(key = %step.key, table = %step.table, id = %step.id, "cascade delete");
            }
        }
        Ok(order)
    }
}
