//! # hashrec codec
//!
//! Value model and string encoding for hashrec records.
//!
//! A hash store keeps every field as a string. This crate defines the typed
//! [`Value`]s a record holds, the [`FieldType`]s a schema declares, and the
//! rules that move between them:
//!
//! - Scalars (`Str`, `Int`, `Float`) are **coerced** on write
//! - Compounds (`List`, `Map`, `Tuple`) must **match exactly** on write and
//!   are stored as JSON text
//! - Decoding is **lenient**: a stored field that no longer parses becomes
//!   [`Value::Corrupted`] instead of failing the whole record
//!
//! ## Usage
//!
//! ```
//! use hashrec_codec::{FieldType, Value};
//!
//! let value = FieldType::Int.coerce(Value::from("42")).unwrap();
//! assert_eq!(value, Value::Int(42));
//!
//! let stored = FieldType::Int.encode(&value).unwrap();
//! assert_eq!(stored, "42");
//! assert_eq!(FieldType::Int.decode(&stored), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod field_type;
mod value;

pub use error::{CodecError, CodecResult};
pub use field_type::FieldType;
pub use serde_json::{Map as JsonMap, Value as Json};
pub use value::Value;
