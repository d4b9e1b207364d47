//! Declared field types and the coercion/encoding rules attached to them.

use crate::error::{CodecError, CodecResult};
use crate::value::{format_float, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

/// The semantic type a schema declares for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text.
    Str,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// JSON array.
    List,
    /// JSON object.
    Map,
    /// JSON array with tuple semantics.
    Tuple,
}

impl FieldType {
    /// Returns the lowercase name of this type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Str => "str",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::List => "list",
            FieldType::Map => "map",
            FieldType::Tuple => "tuple",
        }
    }

    /// Returns true for `List`, `Map` and `Tuple`.
    #[must_use]
    pub const fn is_compound(self) -> bool {
        matches!(self, FieldType::List | FieldType::Map | FieldType::Tuple)
    }

    /// Converts `value` to this type.
    ///
    /// Scalars are coerced: `Str` accepts any scalar, `Int` accepts integers,
    /// finite floats (truncated toward zero) and integer text, `Float`
    /// accepts integers, floats and numeric text. Compounds must already be
    /// of the declared variant.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] when no conversion applies.
    pub fn coerce(self, value: Value) -> CodecResult<Value> {
        let coerced = match (self, &value) {
            (FieldType::Str, Value::Str(_)) => Some(value.clone()),
            (FieldType::Str, Value::Int(_) | Value::Float(_)) => Some(Value::Str(value.to_string())),

            (FieldType::Int, Value::Int(n)) => Some(Value::Int(*n)),
            (FieldType::Int, Value::Float(f)) => float_to_int(*f).map(Value::Int),
            (FieldType::Int, Value::Str(s)) => s.trim().parse::<i64>().ok().map(Value::Int),

            #[allow(clippy::cast_precision_loss)]
            (FieldType::Float, Value::Int(n)) => Some(Value::Float(*n as f64)),
            (FieldType::Float, Value::Float(f)) => Some(Value::Float(*f)),
            (FieldType::Float, Value::Str(s)) => s.trim().parse::<f64>().ok().map(Value::Float),

            (FieldType::List, Value::List(_))
            | (FieldType::Map, Value::Map(_))
            | (FieldType::Tuple, Value::Tuple(_)) => Some(value.clone()),

            _ => None,
        };
        coerced.ok_or_else(|| CodecError::type_mismatch(self, &value))
    }

    /// Renders `value` as the string stored in the hash.
    ///
    /// The value must already be of this type (see [`FieldType::coerce`]).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] if the variant differs from the
    /// declared type and [`CodecError::CorruptedValue`] for the sentinel.
    pub fn encode(self, value: &Value) -> CodecResult<String> {
        match (self, value) {
            (_, Value::Corrupted) => Err(CodecError::CorruptedValue),
            (FieldType::Str, Value::Str(s)) => Ok(s.clone()),
            (FieldType::Int, Value::Int(n)) => Ok(n.to_string()),
            (FieldType::Float, Value::Float(f)) => Ok(format_float(*f)),
            (FieldType::List, Value::List(items)) | (FieldType::Tuple, Value::Tuple(items)) => {
                Ok(serde_json::to_string(items)?)
            }
            // serde_json keeps object keys sorted, so equal maps encode equally.
            (FieldType::Map, Value::Map(map)) => Ok(serde_json::to_string(map)?),
            _ => Err(CodecError::type_mismatch(self, value)),
        }
    }

    /// Parses a stored string back into a value of this type.
    ///
    /// Never fails: text that does not parse yields [`Value::Corrupted`].
    #[must_use]
    pub fn decode(self, raw: &str) -> Value {
        let decoded = match self {
            FieldType::Str => Some(Value::Str(raw.to_string())),
            FieldType::Int => raw.parse::<i64>().ok().map(Value::Int),
            FieldType::Float => raw.parse::<f64>().ok().map(Value::Float),
            FieldType::List | FieldType::Tuple => match serde_json::from_str::<Json>(raw) {
                Ok(Json::Array(items)) if self == FieldType::List => Some(Value::List(items)),
                Ok(Json::Array(items)) => Some(Value::Tuple(items)),
                _ => None,
            },
            FieldType::Map => match serde_json::from_str::<Json>(raw) {
                Ok(Json::Object(map)) => Some(Value::Map(map)),
                _ => None,
            },
        };
        decoded.unwrap_or(Value::Corrupted)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(f: f64) -> Option<i64> {
    let truncated = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    (truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64)
        .then_some(truncated as i64)
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
