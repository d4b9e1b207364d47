//! Error types for the codec crate.

use crate::field_type::FieldType;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while coercing or encoding values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value cannot be converted to the declared field type.
    #[error("expected a possible {expected} value, but received a {found} ({value}) value")]
    TypeMismatch {
        /// The declared type.
        expected: FieldType,
        /// Type name of the supplied value.
        found: &'static str,
        /// The supplied value, rendered for the message.
        value: String,
    },

    /// A corrupted sentinel cannot be written back.
    #[error("cannot encode a corrupted value")]
    CorruptedValue,

    /// JSON serialization failed.
    #[error("json encoding failed: {message}")]
    Json {
        /// Description of the failure.
        message: String,
    },
}

impl CodecError {
    /// Creates a type mismatch error for `value`.
    pub fn type_mismatch(expected: FieldType, value: &crate::Value) -> Self {
        Self::TypeMismatch {
            expected,
            found: value.type_name(),
            value: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}
