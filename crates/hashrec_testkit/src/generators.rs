//! Property-based test generators using proptest.

use hashrec_codec::{FieldType, Json, Value};
use proptest::prelude::*;

/// Strategy for record ids made of characters that never need escaping.
pub fn str_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("valid regex")
}

/// Strategy for JSON scalars that survive a text round trip.
pub fn json_scalar_strategy() -> impl Strategy<Value = Json> {
    prop_oneof![
        any::<i32>().prop_map(Json::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Json::from),
        any::<bool>().prop_map(Json::from),
        Just(Json::Null),
    ]
}

/// Strategy for a field type together with a value of that type.
pub fn typed_value_strategy() -> impl Strategy<Value = (FieldType, Value)> {
    prop_oneof![
        "[ -~]{0,24}".prop_map(|s| (FieldType::Str, Value::Str(s))),
        any::<i64>().prop_map(|n| (FieldType::Int, Value::Int(n))),
        (-1.0e9..1.0e9f64).prop_map(|f| (FieldType::Float, Value::Float(f))),
        prop::collection::vec(json_scalar_strategy(), 0..6)
            .prop_map(|items| (FieldType::List, Value::List(items))),
        prop::collection::vec(json_scalar_strategy(), 0..6)
            .prop_map(|items| (FieldType::Tuple, Value::Tuple(items))),
        prop::collection::btree_map("[a-z]{1,6}", json_scalar_strategy(), 0..6).prop_map(|map| {
            (FieldType::Map, Value::Map(map.into_iter().collect()))
        }),
    ]
}
