//! Result sets returned by `get`.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::schema::Schema;
use hashrec_codec::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Outcome of [`QueryResultSet::filter_by`].
#[derive(Debug, Clone)]
pub enum Filtered {
    /// Nothing matched.
    None,
    /// Exactly one valid record matched.
    One(Record),
    /// Several records matched.
    Many(QueryResultSet),
}

impl Filtered {
    /// Number of matching records.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Filtered::None => 0,
            Filtered::One(_) => 1,
            Filtered::Many(set) => set.len(),
        }
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Filtered::None)
    }

    /// The single match, if exactly one record matched.
    #[must_use]
    pub fn one(self) -> Option<Record> {
        match self {
            Filtered::One(record) => Some(record),
            _ => None,
        }
    }

    /// The matches as a set, if several records matched.
    #[must_use]
    pub fn many(self) -> Option<QueryResultSet> {
        match self {
            Filtered::Many(set) => Some(set),
            _ => None,
        }
    }
}

/// Records of one schema, ordered by id.
#[derive(Debug, Clone)]
pub struct QueryResultSet {
    schema: Arc<Schema>,
    records: Vec<Record>,
}

impl QueryResultSet {
    /// Wraps `records`, which must all belong to `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DifferentModels`] if any record has another schema.
    pub fn new(schema: Arc<Schema>, records: Vec<Record>) -> CoreResult<Self> {
        if let Some(other) = records.iter().find(|r| !r.schema().same_model(&schema)) {
            return Err(CoreError::DifferentModels {
                expected: schema.name().to_string(),
                found: other.schema().name().to_string(),
            });
        }
        Ok(Self { schema, records })
    }

    /// Schema of the records.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// The records as a slice.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consumes the set and returns its records.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Keeps the records whose fields equal every condition.
    ///
    /// Conditions are coerced to the field's type before comparing.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AttributeMissing`] for an undeclared field
    /// - [`CoreError::ConditionTypeMismatch`] for a condition that does not fit
    /// - [`CoreError::CorruptRecord`] if the single match is corrupt
    pub fn filter_by<I, K, V>(&self, conditions: I) -> CoreResult<Filtered>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut wanted = Vec::new();
        for (field, value) in conditions {
            let field = field.as_ref();
            let index = self
                .schema
                .field_index(field)
                .ok_or_else(|| CoreError::attribute_missing(self.schema.table(), field))?;
            let value = self.schema.fields()[index]
                .field_type()
                .coerce(value.into())
                .map_err(|source| CoreError::ConditionTypeMismatch {
                    field: field.to_string(),
                    source,
                })?;
            wanted.push((index, value));
        }

        let mut matches: Vec<Record> = self
            .records
            .iter()
            .filter(|record| {
                wanted
                    .iter()
                    .all(|(index, value)| record.value_at(*index) == Some(value))
            })
            .cloned()
            .collect();

        Ok(match matches.len() {
            0 => Filtered::None,
            1 => {
                let record = matches.remove(0);
                ensure_valid(&record)?;
                Filtered::One(record)
            }
            _ => Filtered::Many(Self {
                schema: Arc::clone(&self.schema),
                records: matches,
            }),
        })
    }

    /// The first record, or the one with the smallest `key` value.
    ///
    /// Ties keep id order. Records whose `key` value is corrupted are only
    /// picked when no other record is left.
    ///
    /// # Errors
    ///
    /// [`CoreError::AttributeMissing`] for an undeclared key and
    /// [`CoreError::CorruptRecord`] if the selected record is corrupt.
    pub fn first(&self, key: Option<&str>) -> CoreResult<Option<&Record>> {
        self.pick(key, |a, b| a.cmp_natural(b))
    }

    /// The last record, or the one with the largest `key` value.
    ///
    /// Ties keep id order. Corrupted `key` values are skipped as in
    /// [`QueryResultSet::first`].
    ///
    /// # Errors
    ///
    /// See [`QueryResultSet::first`].
    pub fn last(&self, key: Option<&str>) -> CoreResult<Option<&Record>> {
        match key {
            None => {
                let selected = self.records.last();
                selected.map(ensure_valid).transpose()?;
                Ok(selected)
            }
            Some(_) => self.pick(key, |a, b| b.cmp_natural(a)),
        }
    }

    fn pick(
        &self,
        key: Option<&str>,
        order: impl Fn(&Value, &Value) -> Ordering,
    ) -> CoreResult<Option<&Record>> {
        let selected = match key {
            None => self.records.first(),
            Some(field) => {
                let index = self
                    .schema
                    .field_index(field)
                    .ok_or_else(|| CoreError::attribute_missing(self.schema.table(), field))?;
                let mut sorted: Vec<&Record> = self.records.iter().collect();
                // Corrupted values go last in both directions.
                fn usable(record: &Record, index: usize) -> Option<&Value> {
                    record.value_at(index).filter(|v| !v.is_corrupted())
                }
                sorted.sort_by(|a, b| match (usable(a, index), usable(b, index)) {
                    (Some(x), Some(y)) => order(x, y),
                    (x, y) => x.is_none().cmp(&y.is_none()),
                });
                sorted.first().copied()
            }
        };
        selected.map(ensure_valid).transpose()?;
        Ok(selected)
    }

    /// Returns true if any record is corrupt.
    #[must_use]
    pub fn has_corrupted(&self) -> bool {
        self.records.iter().any(|r| !r.is_valid())
    }

    /// The valid records, or `None` if there are none.
    #[must_use]
    pub fn valid_only(&self) -> Option<QueryResultSet> {
        let records: Vec<Record> = self.records.iter().filter(|r| r.is_valid()).cloned().collect();
        (!records.is_empty()).then(|| Self {
            schema: Arc::clone(&self.schema),
            records,
        })
    }

    /// Ids of the corrupt records.
    #[must_use]
    pub fn report(&self) -> Vec<Value> {
        self.records
            .iter()
            .filter(|r| !r.is_valid())
            .filter_map(|r| r.id().cloned())
            .collect()
    }
}

impl<'a> IntoIterator for &'a QueryResultSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn ensure_valid(record: &Record) -> CoreResult<()> {
    if record.is_valid() {
        return Ok(());
    }
    let schema = record.schema();
    Err(CoreError::CorruptRecord {
        table: schema.table().to_string(),
        id_field: schema.id_field().to_string(),
        id: record.id().map(Value::to_string).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashrec_codec::FieldType;

    fn schema() -> Arc<Schema> {
        Schema::builder("TestModel")
            .db(0)
            .id_field("attr1")
            .auto_id(false)
            .field("attr1", FieldType::Str)
            .field("attr2", FieldType::Int)
            .field("attr3", FieldType::Float)
            .build()
            .unwrap()
    }

    fn record(schema: &Arc<Schema>, id: &str, attr2: i64, attr3: f64) -> Record {
        Record::builder(schema)
            .set("attr1", id)
            .set("attr2", attr2)
            .set("attr3", attr3)
            .build()
            .unwrap()
    }

    fn five() -> QueryResultSet {
        let schema = schema();
        let records = (0..5)
            .map(|i| record(&schema, &format!("r{i}"), i, f64::from(4 - i as i32)))
            .collect();
        QueryResultSet::new(schema, records).unwrap()
    }

    #[test]
    fn mixing_schemas_is_rejected() {
        let a = schema();
        let b = Schema::builder("Other")
            .db(0)
            .field("id", FieldType::Int)
            .build()
            .unwrap();
        let stray = Record::builder(&b).set("id", 1).build().unwrap();
        let err = QueryResultSet::new(a, vec![stray]).unwrap_err();
        assert!(matches!(err, CoreError::DifferentModels { .. }));
    }

    #[test]
    fn filter_by_is_conjunctive() {
        let set = five();
        let one = set.filter_by([("attr2", 3)]).unwrap().one().unwrap();
        assert_eq!(one.id(), Some(&Value::from("r3")));

        let none = set
            .filter_by([("attr2", Value::from(3)), ("attr1", Value::from("nomatch"))])
            .unwrap();
        assert!(none.is_none());

        let all = set.filter_by(Vec::<(&str, Value)>::new()).unwrap();
        assert_eq!(all.count(), 5);
    }

    #[test]
    fn filter_by_coerces_conditions() {
        let set = five();
        assert_eq!(set.filter_by([("attr2", "2")]).unwrap().count(), 1);
        assert_eq!(set.filter_by([("attr3", 4)]).unwrap().count(), 1);

        assert!(matches!(
            set.filter_by([("attr2", "two")]),
            Err(CoreError::ConditionTypeMismatch { .. })
        ));
        assert!(matches!(
            set.filter_by([("nope", 1)]),
            Err(CoreError::AttributeMissing { .. })
        ));
    }

    #[test]
    fn first_and_last() {
        let set = five();
        assert_eq!(set.first(None).unwrap().unwrap().id(), Some(&Value::from("r0")));
        assert_eq!(set.last(None).unwrap().unwrap().id(), Some(&Value::from("r4")));
        // attr3 descends while ids ascend
        assert_eq!(
            set.first(Some("attr3")).unwrap().unwrap().id(),
            Some(&Value::from("r4"))
        );
        assert_eq!(
            set.last(Some("attr3")).unwrap().unwrap().id(),
            Some(&Value::from("r0"))
        );
        assert!(set.first(Some("missing")).is_err());
    }

    #[test]
    fn ties_keep_id_order() {
        let schema = schema();
        let records = vec![
            record(&schema, "a", 1, 0.0),
            record(&schema, "b", 1, 0.0),
        ];
        let set = QueryResultSet::new(schema, records).unwrap();
        assert_eq!(set.first(Some("attr2")).unwrap().unwrap().id(), Some(&Value::from("a")));
        assert_eq!(set.last(Some("attr2")).unwrap().unwrap().id(), Some(&Value::from("a")));
    }

    #[test]
    fn empty_sets() {
        let set = QueryResultSet::new(schema(), Vec::new()).unwrap();
        assert!(set.is_empty());
        assert!(set.first(None).unwrap().is_none());
        assert!(set.last(Some("attr2")).unwrap().is_none());
        assert!(set.valid_only().is_none());
        assert!(set.filter_by([("attr2", 1)]).unwrap().is_none());
    }

    #[test]
    fn corruption_accessors() {
        let schema = schema();
        let mut bad = record(&schema, "bad", 7, 0.0);
        bad.flag_corrupt();
        let set = QueryResultSet::new(
            Arc::clone(&schema),
            vec![record(&schema, "good", 1, 0.0), bad],
        )
        .unwrap();

        assert!(set.has_corrupted());
        assert_eq!(set.report(), vec![Value::from("bad")]);
        assert_eq!(set.valid_only().unwrap().len(), 1);
        assert!(matches!(set.last(None), Err(CoreError::CorruptRecord { .. })));
        assert!(matches!(
            set.filter_by([("attr1", "bad")]),
            Err(CoreError::CorruptRecord { .. })
        ));
        assert!(set.first(None).unwrap().is_some());
    }

    #[test]
    fn keyed_picks_skip_corrupted_values() {
        let schema = schema();
        let mut a = record(&schema, "a", 1, 0.0);
        a.flag_corrupt();
        let set = QueryResultSet::new(
            Arc::clone(&schema),
            vec![a, record(&schema, "b", 5, 0.0), record(&schema, "c", 9, 0.0)],
        )
        .unwrap();

        assert_eq!(set.first(Some("attr2")).unwrap().unwrap().id(), Some(&Value::from("b")));
        assert_eq!(set.last(Some("attr2")).unwrap().unwrap().id(), Some(&Value::from("c")));

        let mut lone = record(&schema, "lone", 1, 0.0);
        lone.flag_corrupt();
        let only_bad = QueryResultSet::new(Arc::clone(&schema), vec![lone]).unwrap();
        assert!(matches!(only_bad.last(Some("attr2")), Err(CoreError::CorruptRecord { .. })));
    }
}
