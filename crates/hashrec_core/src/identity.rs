//! Automatic id assignment.
//!
//! The position of a new record is the number of keys already stored for
//! its table. The count and the following write are separate commands, so
//! two concurrent writers can pick the same id.

use crate::error::CoreResult;
use crate::schema::Schema;
use hashrec_codec::{FieldType, Value};
use hashrec_storage::HashStore;

/// Id for the record at `position` in its table.
#[must_use]
pub fn id_for_position(schema: &Schema, position: u64) -> Value {
    if schema.hash_id() {
        let algorithm = schema.settings().hash_algorithm;
        return Value::Str(algorithm.hex_digest(position.to_string().as_bytes()));
    }
    match schema.id_type() {
        FieldType::Int => Value::Int(i64::try_from(position).unwrap_or(i64::MAX)),
        _ => Value::Str(position.to_string()),
    }
}

/// Computes the next automatic id from the keys currently stored.
pub(crate) fn next_id(store: &mut dyn HashStore, schema: &Schema) -> CoreResult<Value> {
    let position = store.scan(&schema.scan_pattern())?.len() as u64;
    let id = id_for_position(schema, position);
    tracing::debug!(table = schema.table(), position, id = %id, "assigned id");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashAlgorithm, Settings};
    use hashrec_storage::MemoryServer;
    use std::sync::Arc;

    fn schema(id_type: FieldType, hash_id: bool, algorithm: HashAlgorithm) -> Arc<Schema> {
        Schema::builder("Seq")
            .db(0)
            .field("id", id_type)
            .field("n", FieldType::Int)
            .hash_id(hash_id)
            .settings(Arc::new(Settings::new().hash_algorithm(algorithm)))
            .build()
            .unwrap()
    }

    #[test]
    fn positions_follow_id_type() {
        assert_eq!(
            id_for_position(&schema(FieldType::Int, false, HashAlgorithm::Md5), 4),
            Value::from(4)
        );
        assert_eq!(
            id_for_position(&schema(FieldType::Str, false, HashAlgorithm::Md5), 4),
            Value::from("4")
        );
    }

    #[test]
    fn hashed_ids_use_the_configured_algorithm() {
        let md5 = schema(FieldType::Int, true, HashAlgorithm::Md5);
        assert_eq!(
            id_for_position(&md5, 0),
            Value::from("cfcd208495d565ef66e7dff9f98764da")
        );
        let sha = schema(FieldType::Str, true, HashAlgorithm::Sha256);
        assert_eq!(id_for_position(&sha, 0).to_string().len(), 64);
    }

    #[test]
    fn next_id_counts_table_keys_only() {
        let schema = schema(FieldType::Int, false, HashAlgorithm::Md5);
        let mut store = MemoryServer::new().store(0).unwrap();
        assert_eq!(next_id(&mut store, &schema).unwrap(), Value::from(0));

        store.hset("hashrec:seq:0", &[("n".into(), "1".into())]).unwrap();
        store.hset("hashrec:seq:1", &[("n".into(), "1".into())]).unwrap();
        store.hset("hashrec:other:0", &[("n".into(), "1".into())]).unwrap();
        assert_eq!(next_id(&mut store, &schema).unwrap(), Value::from(2));
    }
}
