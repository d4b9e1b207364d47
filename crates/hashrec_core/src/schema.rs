//! Schema declarations.
//!
//! A [`Schema`] is the static field-descriptor table shared by every record
//! of one kind. It is declared once through [`SchemaBuilder`], validated at
//! build time, and then shared as `Arc<Schema>`.
//!
//! ```
//! use hashrec_core::{FieldType, Schema};
//!
//! let users = Schema::builder("User")
//!     .db(0)
//!     .field("name", FieldType::Str)
//!     .field("age", FieldType::Int)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(users.table(), "user");
//! assert_eq!(users.id_field(), "name");
//! ```

use crate::config::{DbSelector, Settings};
use crate::error::{CoreError, CoreResult, ForeignKeyViolation};
use crate::integrity::is_reserved;
use crate::types::ForeignKeyAction;
use hashrec_codec::{FieldType, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Value used when a record is built without one for the field.
#[derive(Debug, Clone)]
pub enum FieldDefault {
    /// The same value every time.
    Fixed(Value),
    /// A fresh value from a generator.
    Generated(fn() -> Value),
}

impl FieldDefault {
    /// Produces the default value.
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            FieldDefault::Fixed(value) => value.clone(),
            FieldDefault::Generated(generate) => generate(),
        }
    }
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    default: Option<FieldDefault>,
    link: Option<usize>,
}

impl FieldDescriptor {
    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Default value, if any.
    #[must_use]
    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    /// Returns true if the field holds a foreign key.
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.link.is_some()
    }
}

/// A foreign key from one field to another schema's id.
#[derive(Debug, Clone)]
pub struct ForeignKeyLink {
    field: String,
    target: Arc<Schema>,
    action: ForeignKeyAction,
}

impl ForeignKeyLink {
    /// Field holding the referenced id.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Referenced schema.
    #[must_use]
    pub fn target(&self) -> &Arc<Schema> {
        &self.target
    }

    /// Action applied when the referenced record is deleted.
    #[must_use]
    pub fn action(&self) -> ForeignKeyAction {
        self.action
    }
}

/// A validated record schema.
#[derive(Debug)]
pub struct Schema {
    name: String,
    table: String,
    db: u32,
    id_index: usize,
    auto_id: bool,
    hash_id: bool,
    expire: Option<f64>,
    testing: bool,
    settings: Arc<Settings>,
    fields: Vec<FieldDescriptor>,
    links: Vec<ForeignKeyLink>,
}

impl Schema {
    /// Starts declaring a schema called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table segment of the storage key.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Logical database index.
    #[must_use]
    pub fn db(&self) -> u32 {
        self.db
    }

    /// Name of the id field.
    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.fields[self.id_index].name
    }

    /// Type of the id field (`Str` or `Int`).
    #[must_use]
    pub fn id_type(&self) -> FieldType {
        self.fields[self.id_index].field_type
    }

    /// Position of the id field in [`Schema::fields`].
    #[must_use]
    pub fn id_index(&self) -> usize {
        self.id_index
    }

    /// Whether a missing id is assigned on add.
    #[must_use]
    pub fn auto_id(&self) -> bool {
        self.auto_id
    }

    /// Whether assigned ids are hashed.
    #[must_use]
    pub fn hash_id(&self) -> bool {
        self.hash_id
    }

    /// Time-to-live in seconds applied on every add.
    #[must_use]
    pub fn expire(&self) -> Option<f64> {
        self.expire
    }

    /// Whether this schema talks to the in-memory fake server.
    #[must_use]
    pub fn testing(&self) -> bool {
        self.testing || self.settings.testing
    }

    /// Settings the schema was declared with.
    #[must_use]
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Declared fields, id field included, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Position of `name` in [`Schema::fields`].
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Descriptor of `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared foreign keys.
    #[must_use]
    pub fn links(&self) -> &[ForeignKeyLink] {
        &self.links
    }

    /// Link held by the field at `index`, if any.
    #[must_use]
    pub fn link_at(&self, index: usize) -> Option<&ForeignKeyLink> {
        self.fields
            .get(index)
            .and_then(|f| f.link)
            .and_then(|link| self.links.get(link))
    }

    /// Storage key of the record with `id`.
    #[must_use]
    pub fn key(&self, id: &Value) -> String {
        format!("{}{id}", self.key_prefix())
    }

    /// Glob pattern matching every key of this table.
    #[must_use]
    pub fn scan_pattern(&self) -> String {
        format!("{}*", escape_glob(&self.key_prefix()))
    }

    /// Recovers the id from a storage key of this table.
    #[must_use]
    pub fn id_from_key(&self, key: &str) -> Option<Value> {
        key.strip_prefix(&self.key_prefix())
            .map(|suffix| self.id_type().decode(suffix))
            .filter(|id| !id.is_corrupted())
    }

    /// Returns true if both schemas describe the same records.
    #[must_use]
    pub fn same_model(&self, other: &Schema) -> bool {
        self.name == other.name && self.table == other.table && self.db == other.db
    }

    fn key_prefix(&self) -> String {
        let sep = &self.settings.separator;
        format!("{}{sep}{}{sep}", self.settings.prefix, self.table)
    }
}

fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

enum Declared {
    Field {
        name: String,
        field_type: FieldType,
        default: Option<FieldDefault>,
    },
    Link {
        name: String,
        target: Arc<Schema>,
    },
}

impl Declared {
    fn name(&self) -> &str {
        match self {
            Declared::Field { name, .. } | Declared::Link { name, .. } => name,
        }
    }
}

/// Declares a [`Schema`].
///
/// Errors are collected and reported by [`SchemaBuilder::build`].
pub struct SchemaBuilder {
    name: String,
    table: Option<String>,
    db: Option<DbSelector>,
    id_field: Option<String>,
    auto_id: bool,
    hash_id: bool,
    expire: Option<f64>,
    testing: bool,
    settings: Option<Arc<Settings>>,
    declared: Vec<Declared>,
    actions: Vec<(String, ForeignKeyAction)>,
}

impl SchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            db: None,
            id_field: None,
            auto_id: true,
            hash_id: false,
            expire: None,
            testing: false,
            settings: None,
            declared: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.declared.push(Declared::Field {
            name: name.into(),
            field_type,
            default: None,
        });
        self
    }

    /// Declares a field with a default value.
    #[must_use]
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        default: FieldDefault,
    ) -> Self {
        self.declared.push(Declared::Field {
            name: name.into(),
            field_type,
            default: Some(default),
        });
        self
    }

    /// Declares a foreign key field pointing at `target`'s id.
    #[must_use]
    pub fn reference(mut self, name: impl Into<String>, target: &Arc<Schema>) -> Self {
        self.declared.push(Declared::Link {
            name: name.into(),
            target: Arc::clone(target),
        });
        self
    }

    /// Sets the delete action of a foreign key field.
    #[must_use]
    pub fn action(mut self, field: impl Into<String>, action: ForeignKeyAction) -> Self {
        self.actions.push((field.into(), action));
        self
    }

    /// Overrides the table name (defaults to the lowercased schema name).
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the logical database. Required.
    #[must_use]
    pub fn db(mut self, db: impl Into<DbSelector>) -> Self {
        self.db = Some(db.into());
        self
    }

    /// Names the id field (defaults to the first declared field).
    #[must_use]
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = Some(name.into());
        self
    }

    /// Enables or disables automatic ids (enabled by default).
    #[must_use]
    pub const fn auto_id(mut self, enabled: bool) -> Self {
        self.auto_id = enabled;
        self
    }

    /// Hashes automatic ids with the configured algorithm.
    #[must_use]
    pub const fn hash_id(mut self, enabled: bool) -> Self {
        self.hash_id = enabled;
        self
    }

    /// Sets a time-to-live, in seconds, applied on every add.
    #[must_use]
    pub const fn expire(mut self, seconds: f64) -> Self {
        self.expire = Some(seconds);
        self
    }

    /// Routes this schema to the in-memory fake server.
    #[must_use]
    pub const fn testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    /// Uses `settings` instead of [`Settings::default`].
    #[must_use]
    pub fn settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Validates the declaration.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidSchema`] for a missing database, reserved or
    ///   duplicate field names, or an id field that is not `Str`/`Int`
    /// - [`CoreError::UnknownDatabase`] for an unknown database name
    /// - [`CoreError::ForeignKey`] for self references, actions without links,
    ///   links without actions, or links to another server
    pub fn build(self) -> CoreResult<Arc<Schema>> {
        let name = self.name;
        if name.is_empty() {
            return Err(CoreError::invalid_schema(name, "schema name must not be empty"));
        }
        let settings = self.settings.unwrap_or_default();
        let db = self
            .db
            .ok_or_else(|| CoreError::invalid_schema(&name, "specify the database"))?
            .resolve(&settings)?;
        let table = self.table.unwrap_or_else(|| name.to_lowercase());
        if table.is_empty() {
            return Err(CoreError::invalid_schema(name, "table name must not be empty"));
        }

        let mut seen = HashSet::new();
        for declared in &self.declared {
            let field = declared.name();
            if field.is_empty() || is_reserved(field) {
                return Err(CoreError::invalid_schema(
                    &name,
                    format!("cannot declare fields that start and end with \"__\" ({field})"),
                ));
            }
            if !seen.insert(field) {
                return Err(CoreError::invalid_schema(
                    &name,
                    format!("field {field} is declared twice"),
                ));
            }
        }

        let mut actions: Vec<(String, ForeignKeyAction)> = Vec::new();
        for (field, action) in self.actions {
            let is_link = self
                .declared
                .iter()
                .any(|d| matches!(d, Declared::Link { name, .. } if *name == field));
            if !is_link {
                return Err(ForeignKeyViolation::UndeclaredAction { table, field }.into());
            }
            if actions.iter().any(|(f, _)| *f == field) {
                return Err(CoreError::invalid_schema(
                    &name,
                    format!("foreign key {field} has more than one action"),
                ));
            }
            actions.push((field, action));
        }

        let id_name = match self.id_field {
            Some(id) => id,
            None => self
                .declared
                .iter()
                .find_map(|d| match d {
                    Declared::Field { name, .. } => Some(name.clone()),
                    Declared::Link { .. } => None,
                })
                .ok_or_else(|| CoreError::invalid_schema(&name, "declare at least one field"))?,
        };
        if is_reserved(&id_name) {
            return Err(CoreError::invalid_schema(
                &name,
                format!("cannot use {id_name} as the id field"),
            ));
        }

        let mut fields = Vec::with_capacity(self.declared.len() + 1);
        let mut links = Vec::new();
        for declared in self.declared {
            match declared {
                Declared::Field {
                    name: field,
                    field_type,
                    default,
                } => fields.push(FieldDescriptor {
                    name: field,
                    field_type,
                    default,
                    link: None,
                }),
                Declared::Link {
                    name: field,
                    target,
                } => {
                    if field == id_name {
                        return Err(CoreError::invalid_schema(
                            &name,
                            format!("the id field {field} cannot be a foreign key"),
                        ));
                    }
                    if target.table == table && target.db == db {
                        return Err(ForeignKeyViolation::SelfReference { table, field }.into());
                    }
                    let differences = settings.connection_differences(&target.settings);
                    if !differences.is_empty() {
                        return Err(ForeignKeyViolation::ConnectionMismatch {
                            table,
                            referenced_table: target.table.clone(),
                            differences: differences.join(", "),
                        }
                        .into());
                    }
                    let action = actions
                        .iter()
                        .find(|(f, _)| *f == field)
                        .map(|(_, action)| *action)
                        .ok_or_else(|| ForeignKeyViolation::MissingAction {
                            table: table.clone(),
                            field: field.clone(),
                        })?;
                    fields.push(FieldDescriptor {
                        name: field.clone(),
                        field_type: target.id_type(),
                        default: None,
                        link: Some(links.len()),
                    });
                    links.push(ForeignKeyLink {
                        field,
                        target,
                        action,
                    });
                }
            }
        }

        let id_index = match fields.iter().position(|f| f.name == id_name) {
            Some(index) => index,
            None => {
                // An undeclared id field is text.
                fields.insert(
                    0,
                    FieldDescriptor {
                        name: id_name,
                        field_type: FieldType::Str,
                        default: None,
                        link: None,
                    },
                );
                0
            }
        };
        let id = &mut fields[id_index];
        if !matches!(id.field_type, FieldType::Str | FieldType::Int) {
            return Err(CoreError::invalid_schema(
                &name,
                format!(
                    "the id field {} must be of type int or str, not {}",
                    id.name, id.field_type
                ),
            ));
        }
        if self.hash_id {
            id.field_type = FieldType::Str;
        }

        tracing::debug!(schema = %name, %table, db, fields = fields.len(), links = links.len(), "schema declared");
        Ok(Arc::new(Schema {
            name,
            table,
            db,
            id_index,
            auto_id: self.auto_id,
            hash_id: self.hash_id,
            expire: self.expire,
            testing: self.testing,
            settings,
            fields,
            links,
        }))
    }
}
