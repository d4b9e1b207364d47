//! Error types for hashrec core.

use hashrec_codec::CodecError;
use hashrec_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in hashrec core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Every connection attempt failed.
    #[error("unable to connect to database {db} after {attempts} attempt(s): {source}")]
    ConnectionFailure {
        /// Logical database that was requested.
        db: u32,
        /// Number of attempts made.
        attempts: u32,
        /// The error from the last attempt.
        #[source]
        source: StorageError,
    },

    /// A placeholder record was passed where a full record is required.
    #[error("{table}: the record must be instantiated to be added to the database")]
    NotInstantiated {
        /// Table of the record.
        table: String,
    },

    /// The key is already taken and overwriting was not allowed.
    #[error("{key} already exists in the database")]
    AlreadyExists {
        /// Storage key of the record.
        key: String,
    },

    /// Neither a bound record nor an explicit id was supplied.
    #[error("{table}: use a record with an id or provide an identifier")]
    NoIdentifier {
        /// Table that was addressed.
        table: String,
    },

    /// The addressed record does not exist.
    #[error("{key} does not exist in the database")]
    NoSuchRecord {
        /// Storage key that was looked up.
        key: String,
    },

    /// A value could not be coerced to its field's declared type.
    #[error("{table}.{field}: {source}")]
    TypeMismatch {
        /// Table of the record.
        table: String,
        /// Field that rejected the value.
        field: String,
        /// The underlying coercion error.
        #[source]
        source: CodecError,
    },

    /// The configured expiry is not a positive finite number of seconds.
    #[error("{table}: expire must be a positive number of seconds, got {seconds}")]
    InvalidExpire {
        /// Table of the record.
        table: String,
        /// The offending expiry.
        seconds: f64,
    },

    /// Foreign key rule violated.
    #[error("foreign key violation: {0}")]
    ForeignKey(#[from] ForeignKeyViolation),

    /// A record selected by a single-record accessor is corrupt.
    #[error("{table}: the information in this record ({id_field}: {id}) is corrupt")]
    CorruptRecord {
        /// Table of the record.
        table: String,
        /// Name of the id field.
        id_field: String,
        /// Id of the record, rendered.
        id: String,
    },

    /// A field name is not declared by the schema.
    #[error("{table} does not have the {field} attribute")]
    AttributeMissing {
        /// Table of the schema.
        table: String,
        /// The unknown field.
        field: String,
    },

    /// A filter condition could not be coerced to the field's type.
    #[error("invalid {field} condition: {source}")]
    ConditionTypeMismatch {
        /// Field the condition applies to.
        field: String,
        /// The underlying coercion error.
        #[source]
        source: CodecError,
    },

    /// A result set was built from records of different schemas.
    #[error("all records must share one schema ({expected} != {found})")]
    DifferentModels {
        /// Schema of the first record.
        expected: String,
        /// The first schema that differed.
        found: String,
    },

    /// Unknown corruption policy.
    #[error("invalid corruption policy {policy:?}; expected flag, skip or ignore")]
    InvalidPolicy {
        /// The rejected policy text.
        policy: String,
    },

    /// No logical database carries this name.
    #[error("there is no database named {name}")]
    UnknownDatabase {
        /// The unknown name.
        name: String,
    },

    /// The database name is already bound to an index.
    #[error("database name {name} is already bound to index {index}")]
    DatabaseNameTaken {
        /// The name.
        name: String,
        /// Index it is bound to.
        index: u32,
    },

    /// The schema declaration is inconsistent.
    #[error("invalid schema {name}: {message}")]
    InvalidSchema {
        /// Schema name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// A field without a default was not given a value.
    #[error("{table}: {field} must receive a value")]
    MissingValue {
        /// Table of the record.
        table: String,
        /// The field left empty.
        field: String,
    },

    /// Settings could not be loaded or are out of range.
    #[error("invalid settings: {message}")]
    InvalidSettings {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid schema error.
    pub fn invalid_schema(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid settings error.
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }

    /// Creates an attribute missing error.
    pub fn attribute_missing(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::AttributeMissing {
            table: table.into(),
            field: field.into(),
        }
    }
}

/// Ways a foreign key rule can be broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForeignKeyViolation {
    /// A `restrict` link blocks the delete.
    #[error("could not delete {table} record {id} because it is a restricted reference of {referencing_table} ({referencing_id})")]
    Restricted {
        /// Table of the record being deleted.
        table: String,
        /// Id of the record being deleted.
        id: String,
        /// Table of the record holding the link.
        referencing_table: String,
        /// Id of the record holding the link.
        referencing_id: String,
    },

    /// A stored back-reference carries an unknown action.
    #[error("the {action:?} action stored for {key} is not valid; try cascade or restrict")]
    InvalidAction {
        /// The stored action text.
        action: String,
        /// Key of the referencing record.
        key: String,
    },

    /// The referenced record does not exist.
    #[error("there is no {table} record with id {id} for foreign key {field}")]
    ReferencedRecordMissing {
        /// Field holding the link.
        field: String,
        /// Referenced table.
        table: String,
        /// Referenced id, rendered.
        id: String,
    },

    /// Linked schemas talk to different servers.
    #[error("{table} and {referenced_table} must share host, port and password; differences: {differences}")]
    ConnectionMismatch {
        /// Referencing table.
        table: String,
        /// Referenced table.
        referenced_table: String,
        /// Comma-separated list of differing parameters.
        differences: String,
    },

    /// A link was declared without an action.
    #[error("{table}: foreign key {field} needs an action")]
    MissingAction {
        /// Table of the schema.
        table: String,
        /// The link without action.
        field: String,
    },

    /// An action was configured for a field that is not a link.
    #[error("{table}: define foreign key {field} to set an action for it")]
    UndeclaredAction {
        /// Table of the schema.
        table: String,
        /// The field named by the action.
        field: String,
    },

    /// A schema tried to reference itself.
    #[error("{table}: cannot define a foreign key to the same schema ({field})")]
    SelfReference {
        /// Table of the schema.
        table: String,
        /// The offending field.
        field: String,
    },

    /// A record was built without a value for a link.
    #[error("{table}: set a value for the foreign key {field}")]
    MissingReference {
        /// Table of the record.
        table: String,
        /// The link left empty.
        field: String,
    },
}
