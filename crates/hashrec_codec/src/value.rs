//! Dynamic field value type.

use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::fmt;

/// A typed field value held by a record.
///
/// Compound variants keep their elements as JSON values because that is the
/// form they are stored in.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Text.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Ordered, growable sequence.
    List(Vec<Json>),
    /// String-keyed map (keys kept sorted).
    Map(Map<String, Json>),
    /// Fixed sequence. Stored like a list but declared separately.
    Tuple(Vec<Json>),
    /// Sentinel for a stored field that could not be decoded or that belongs
    /// to a record whose digest did not verify.
    Corrupted,
}

impl Value {
    /// Builds a list value.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Json>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a tuple value.
    pub fn tuple<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Json>,
    {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Builds a map value.
    pub fn map<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Json>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns the name of this value's variant, as used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Tuple(_) => "tuple",
            Value::Corrupted => "corrupted",
        }
    }

    /// Returns true for the corrupted sentinel.
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Value::Corrupted)
    }

    /// Returns the text if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the float if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) | Value::Float(_) => 0,
            Value::Str(_) => 1,
            Value::List(_) | Value::Tuple(_) | Value::Map(_) => 2,
            Value::Corrupted => 3,
        }
    }

    /// Total order used for sorting records by a field.
    ///
    /// Numbers compare numerically (integers and floats together), text
    /// lexicographically, compounds by their JSON text. Numbers sort before
    /// text, text before compounds, and the corrupted sentinel last.
    #[must_use]
    pub fn cmp_natural(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = self.as_f64_lossy();
                let b = other.as_f64_lossy();
                a.total_cmp(&b)
            }
            _ if self.rank() != other.rank() => self.rank().cmp(&other.rank()),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64_lossy(&self) -> f64 {
        match self {
            Value::Int(n) => *n as f64,
            Value::Float(f) => *f,
            _ => f64::NAN,
        }
    }
}

/// Formats a float so that parsing the text gives back the same bits and
/// integral values keep a trailing `.0`.
pub(crate) fn format_float(f: f64) -> String {
    format!("{f:?}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::List(items) | Value::Tuple(items) => {
                write!(f, "{}", Json::Array(items.clone()))
            }
            Value::Map(map) => write!(f, "{}", Json::Object(map.clone())),
            Value::Corrupted => f.write_str("<corrupted>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Map<String, Json>> for Value {
    fn from(map: Map<String, Json>) -> Self {
        Value::Map(map)
    }
}
