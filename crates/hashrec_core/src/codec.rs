//! Record <-> field map conversion.

use crate::error::{CoreError, CoreResult};
use crate::integrity::{BACK_REFERENCES_FIELD, DIGEST_FIELD};
use crate::record::Record;
use crate::references::parse_back_references;
use crate::schema::Schema;
use crate::types::RecordState;
use hashrec_codec::{CodecError, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Converts records to and from the flat string maps a hash store keeps.
///
/// Reserved fields are neither produced by [`RecordCodec::encode`] nor
/// exposed as values by [`RecordCodec::decode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl RecordCodec {
    /// Encodes every field of `record`, id included.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotInstantiated`] for a placeholder
    /// - [`CoreError::NoIdentifier`] while the id is still pending
    /// - [`CoreError::TypeMismatch`] if a value does not match its field type
    pub fn encode(record: &Record) -> CoreResult<BTreeMap<String, String>> {
        let schema = record.schema();
        if record.state() == RecordState::Placeholder {
            return Err(CoreError::NotInstantiated {
                table: schema.table().to_string(),
            });
        }

        let mut encoded = BTreeMap::new();
        for (index, field) in schema.fields().iter().enumerate() {
            let value = match record.value_at(index) {
                Some(value) => value,
                None if index == schema.id_index() => {
                    return Err(CoreError::NoIdentifier {
                        table: schema.table().to_string(),
                    })
                }
                None => {
                    return Err(CoreError::MissingValue {
                        table: schema.table().to_string(),
                        field: field.name().to_string(),
                    })
                }
            };
            let text = field.field_type().encode(value).map_err(|err| match err {
                CodecError::TypeMismatch { .. } => CoreError::TypeMismatch {
                    table: schema.table().to_string(),
                    field: field.name().to_string(),
                    source: err,
                },
                other => CoreError::Codec(other),
            })?;
            encoded.insert(field.name().to_string(), text);
        }
        Ok(encoded)
    }

    /// Decodes the raw fields stored for the record with `id`.
    ///
    /// The id is taken from the storage key, not from the stored fields.
    /// A field that is absent or no longer parses becomes
    /// [`Value::Corrupted`]; the digest check decides overall validity.
    #[must_use]
    pub fn decode(schema: &Arc<Schema>, id: Value, raw: &BTreeMap<String, String>) -> Record {
        let id_index = schema.id_index();
        let mut id = Some(id);
        let values = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(index, field)| {
                if index == id_index {
                    return id.take();
                }
                Some(
                    raw.get(field.name())
                        .map_or(Value::Corrupted, |text| field.field_type().decode(text)),
                )
            })
            .collect();

        Record::from_store(
            schema,
            values,
            raw.get(DIGEST_FIELD).cloned(),
            parse_back_references(raw.get(BACK_REFERENCES_FIELD).map(String::as_str)),
        )
    }
}
