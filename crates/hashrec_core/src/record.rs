//! Records: instances of a schema.

use crate::error::{CoreError, CoreResult, ForeignKeyViolation};
use crate::references::BackReference;
use crate::schema::Schema;
use crate::types::{RecordState, RecordStatus};
use hashrec_codec::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One record of a [`Schema`].
///
/// Values are kept in schema field order. A slot is empty only for the id of
/// an [`RecordState::Unbound`] record and for every non-id field of a
/// [`RecordState::Placeholder`].
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Option<Value>>,
    state: RecordState,
    status: RecordStatus,
    digest: Option<String>,
    back_references: BTreeMap<String, BackReference>,
}

impl Record {
    /// Starts building a record of `schema`.
    #[must_use]
    pub fn builder(schema: &Arc<Schema>) -> RecordBuilder {
        RecordBuilder {
            schema: Arc::clone(schema),
            assigned: Vec::new(),
        }
    }

    /// Creates an id-only handle used to address a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if `id` does not fit the id type.
    pub fn placeholder(schema: &Arc<Schema>, id: impl Into<Value>) -> CoreResult<Self> {
        let id = coerce_id(schema, id.into())?;
        let mut values = vec![None; schema.fields().len()];
        values[schema.id_index()] = Some(id);
        Ok(Self {
            schema: Arc::clone(schema),
            values,
            state: RecordState::Placeholder,
            status: RecordStatus::Valid,
            digest: None,
            back_references: BTreeMap::new(),
        })
    }

    pub(crate) fn from_store(
        schema: &Arc<Schema>,
        values: Vec<Option<Value>>,
        digest: Option<String>,
        back_references: BTreeMap<String, BackReference>,
    ) -> Self {
        Self {
            schema: Arc::clone(schema),
            values,
            state: RecordState::Persisted,
            status: RecordStatus::Valid,
            digest,
            back_references,
        }
    }

    /// The record's schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The id, once assigned.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.values[self.schema.id_index()].as_ref()
    }

    /// The storage key, once the id is assigned.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.id().map(|id| self.schema.key(id))
    }

    /// Value of `field`, if declared and set.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema
            .field_index(field)
            .and_then(|index| self.values[index].as_ref())
    }

    pub(crate) fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Field names with their values, in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| (field.name(), value.as_ref()))
    }

    /// Replaces the value of `field`.
    ///
    /// A persisted record becomes [`RecordState::Bound`] until added again.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotInstantiated`] on a placeholder
    /// - [`CoreError::AttributeMissing`] if `field` is not declared
    /// - [`CoreError::TypeMismatch`] if the value does not fit
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> CoreResult<()> {
        if self.state == RecordState::Placeholder {
            return Err(CoreError::NotInstantiated {
                table: self.schema.table().to_string(),
            });
        }
        let index = self
            .schema
            .field_index(field)
            .ok_or_else(|| CoreError::attribute_missing(self.schema.table(), field))?;
        let value = coerce_field(&self.schema, index, value.into())?;
        self.values[index] = Some(value);
        if self.state != RecordState::Unbound || index == self.schema.id_index() {
            self.state = RecordState::Bound;
        }
        Ok(())
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Digest status; only fetched records can be corrupt.
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    /// Returns true unless the record was flagged corrupt.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == RecordStatus::Valid
    }

    /// Digest written by the last add, or read with the record.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Records referencing this one, keyed by their storage key.
    ///
    /// Only populated on fetched records.
    #[must_use]
    pub fn back_references(&self) -> &BTreeMap<String, BackReference> {
        &self.back_references
    }

    pub(crate) fn assign_id(&mut self, id: Value) {
        let index = self.schema.id_index();
        self.values[index] = Some(id);
        if self.state == RecordState::Unbound {
            self.state = RecordState::Bound;
        }
    }

    pub(crate) fn mark_persisted(&mut self, digest: String) {
        self.state = RecordState::Persisted;
        self.digest = Some(digest);
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = RecordState::Deleted;
    }

    /// Marks the record corrupt and hides every value except the id.
    pub(crate) fn flag_corrupt(&mut self) {
        self.status = RecordStatus::Corrupt;
        let id_index = self.schema.id_index();
        for (index, value) in self.values.iter_mut().enumerate() {
            if index != id_index {
                *value = Some(Value::Corrupted);
            }
        }
    }
}

/// Builds a [`Record`], applying defaults and type coercion.
#[derive(Debug)]
pub struct RecordBuilder {
    schema: Arc<Schema>,
    assigned: Vec<(String, Value)>,
}

impl RecordBuilder {
    /// Sets `field` to `value`. Later calls for the same field win.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assigned.push((field.into(), value.into()));
        self
    }

    /// Validates and builds the record.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AttributeMissing`] for a field the schema lacks
    /// - [`CoreError::TypeMismatch`] for a value that cannot be coerced
    /// - [`CoreError::ForeignKey`] with `MissingReference` for an unset link
    /// - [`CoreError::MissingValue`] for any other unset field without default
    pub fn build(self) -> CoreResult<Record> {
        let schema = self.schema;
        let mut values: Vec<Option<Value>> = vec![None; schema.fields().len()];

        for (field, value) in self.assigned {
            let index = schema
                .field_index(&field)
                .ok_or_else(|| CoreError::attribute_missing(schema.table(), &field))?;
            values[index] = Some(coerce_field(&schema, index, value)?);
        }

        for (index, field) in schema.fields().iter().enumerate() {
            if values[index].is_some() {
                continue;
            }
            if field.is_link() {
                return Err(ForeignKeyViolation::MissingReference {
                    table: schema.table().to_string(),
                    field: field.name().to_string(),
                }
                .into());
            }
            if let Some(default) = field.default() {
                values[index] = Some(coerce_field(&schema, index, default.produce())?);
            } else if !(index == schema.id_index() && schema.auto_id()) {
                return Err(CoreError::MissingValue {
                    table: schema.table().to_string(),
                    field: field.name().to_string(),
                });
            }
        }

        let state = if values[schema.id_index()].is_some() {
            RecordState::Bound
        } else {
            RecordState::Unbound
        };
        Ok(Record {
            schema,
            values,
            state,
            status: RecordStatus::Valid,
            digest: None,
            back_references: BTreeMap::new(),
        })
    }
}

fn coerce_field(schema: &Schema, index: usize, value: Value) -> CoreResult<Value> {
    let field = &schema.fields()[index];
    field
        .field_type()
        .coerce(value)
        .map_err(|source| CoreError::TypeMismatch {
            table: schema.table().to_string(),
            field: field.name().to_string(),
            source,
        })
}

pub(crate) fn coerce_id(schema: &Schema, id: Value) -> CoreResult<Value> {
    coerce_field(schema, schema.id_index(), id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefault;
    use crate::types::ForeignKeyAction;
    use hashrec_codec::FieldType;

    fn model(auto_id: bool) -> Arc<Schema> {
        Schema::builder("TestModel")
            .db(0)
            .id_field("attr1")
            .auto_id(auto_id)
            .field("attr1", FieldType::Str)
            .field("attr2", FieldType::Int)
            .field("attr3", FieldType::Float)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_coerces_scalars() {
        let record = Record::builder(&model(false))
            .set("attr1", 10)
            .set("attr2", "5")
            .set("attr3", 1)
            .build()
            .unwrap();
        assert_eq!(record.id(), Some(&Value::from("10")));
        assert_eq!(record.get("attr2"), Some(&Value::from(5)));
        assert_eq!(record.get("attr3"), Some(&Value::from(1.0)));
        assert_eq!(record.state(), RecordState::Bound);
        assert_eq!(record.key().unwrap(), "hashrec:testmodel:10");
    }

    #[test]
    fn auto_id_leaves_record_unbound() {
        let record = Record::builder(&model(true))
            .set("attr2", 0)
            .set("attr3", 0.0)
            .build()
            .unwrap();
        assert_eq!(record.state(), RecordState::Unbound);
        assert_eq!(record.id(), None);
        assert_eq!(record.key(), None);
    }

    #[test]
    fn missing_values_and_unknown_fields() {
        let missing = Record::builder(&model(false)).set("attr1", "a").build();
        assert!(matches!(missing, Err(CoreError::MissingValue { field, .. }) if field == "attr2"));

        let unknown = Record::builder(&model(false)).set("nope", 1).build();
        assert!(matches!(unknown, Err(CoreError::AttributeMissing { .. })));

        let bad = Record::builder(&model(false))
            .set("attr1", "a")
            .set("attr2", "two")
            .set("attr3", 0.0)
            .build();
        assert!(matches!(bad, Err(CoreError::TypeMismatch { field, .. }) if field == "attr2"));
    }

    #[test]
    fn defaults_fill_unset_fields() {
        fn now() -> Value {
            Value::from(42)
        }
        let schema = Schema::builder("T")
            .db(0)
            .field("id", FieldType::Int)
            .field_with_default("stamp", FieldType::Int, FieldDefault::Generated(now))
            .field_with_default("label", FieldType::Str, FieldDefault::Fixed(Value::from("none")))
            .build()
            .unwrap();
        let record = Record::builder(&schema).set("id", 1).build().unwrap();
        assert_eq!(record.get("stamp"), Some(&Value::from(42)));
        assert_eq!(record.get("label"), Some(&Value::from("none")));
    }

    #[test]
    fn links_require_a_value() {
        let parent = model(false);
        let child = Schema::builder("Child")
            .db(0)
            .field("id", FieldType::Int)
            .reference("parent", &parent)
            .action("parent", ForeignKeyAction::Cascade)
            .build()
            .unwrap();
        let err = Record::builder(&child).set("id", 1).build().unwrap_err();
        assert!(matches!(
            err,
            CoreError::ForeignKey(ForeignKeyViolation::MissingReference { .. })
        ));

        let record = Record::builder(&child)
            .set("id", 1)
            .set("parent", 5)
            .build()
            .unwrap();
        assert_eq!(record.get("parent"), Some(&Value::from("5")));
    }

    #[test]
    fn placeholder_holds_only_the_id() {
        let schema = model(false);
        let mut handle = Record::placeholder(&schema, "x").unwrap();
        assert_eq!(handle.state(), RecordState::Placeholder);
        assert_eq!(handle.id(), Some(&Value::from("x")));
        assert_eq!(handle.get("attr2"), None);
        assert!(matches!(
            handle.set("attr2", 1),
            Err(CoreError::NotInstantiated { .. })
        ));
    }

    #[test]
    fn set_rebinds_persisted_records() {
        let mut record = Record::builder(&model(false))
            .set("attr1", "a")
            .set("attr2", 1)
            .set("attr3", 1.0)
            .build()
            .unwrap();
        record.mark_persisted("d".into());
        record.set("attr2", 2).unwrap();
        assert_eq!(record.state(), RecordState::Bound);
        assert_eq!(record.get("attr2"), Some(&Value::from(2)));
    }

    #[test]
    fn flagging_hides_everything_but_the_id() {
        let mut record = Record::builder(&model(false))
            .set("attr1", "a")
            .set("attr2", 1)
            .set("attr3", 1.0)
            .build()
            .unwrap();
        record.flag_corrupt();
        assert!(!record.is_valid());
        assert_eq!(record.id(), Some(&Value::from("a")));
        assert_eq!(record.get("attr2"), Some(&Value::Corrupted));
        assert_eq!(record.get("attr3"), Some(&Value::Corrupted));
    }
}
