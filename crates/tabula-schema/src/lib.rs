//! Schema model for tabula.
//!
//! A [`Table`] or [`Proc`] describes one managed entity as the migration
//! engine sees it. The same types are used for the *desired* state (resolved
//! from declarations) and the *current* state (loaded from the cache store).
//!
//! Keys and foreign keys refer to their fields by name; the owning [`Table`]
//! is the arena the names are looked up in.

use indexmap::IndexSet;
use thiserror::Error;

mod access;
pub use access::*;

mod naming;
pub use naming::*;

mod projection;
pub use projection::*;


/// Invariant violations in the schema model.
///
/// These indicate a bug in how a schema was put together, never a condition
/// that a migration run can recover from.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field {field} cannot be in two separate partitions of {pattern}")]
    FieldInTwoPartitions { pattern: String, field: String },

    #[error("duplicate index name {name} on table {table}")]
    DuplicateIndex { table: String, name: String },

    #[error("duplicate foreign key name {name} on table {table}")]
    DuplicateForeignKey { table: String, name: String },

    #[error("table {table} has no field named {field}")]
    UnknownField { table: String, field: String },

    #[error("no table named {0}")]
    UnknownTable(String),

    #[error(
        "foreign key {fkey} on {table} has no unique index on {target} covering exactly ({fields})"
    )]
    MissingBackingIndex {
        table: String,
        fkey: String,
        target: String,
        fields: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// The column type, verbatim as the dialect expects it.
    pub db_type: String,
    pub nullable: bool,
    /// Whether the database generates values for this column.
    pub identity: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, db_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
            nullable,
            identity: false,
        }
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Whether two fields describe the same column, ignoring nullability.
    ///
    /// Identity only takes part in the comparison on dialects where it is a
    /// property of the column itself.
    pub fn same_column(&self, other: &Field, uses_identity: bool) -> bool {
        self.name == other.name
            && self.db_type == other.db_type
            && (!uses_identity || self.identity == other.identity)
    }
}

/// What kind of index a [`Key`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Primary,
    Unique,
    Plain,
}

impl KeyKind {
    /// The short tag used in key names and cache records.
    pub fn tag(self) -> &'static str {
        match self {
            KeyKind::Primary => "pk",
            KeyKind::Unique => "uk",
            KeyKind::Plain => "ix",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "pk" => KeyKind::Primary,
            "uk" => KeyKind::Unique,
            _ => KeyKind::Plain,
        }
    }

    /// Recover the kind from a generated key name.
    pub fn from_name(name: &str) -> Self {
        if name.starts_with("pk") {
            KeyKind::Primary
        } else if name.starts_with("uk") {
            KeyKind::Unique
        } else {
            KeyKind::Plain
        }
    }

    pub fn is_unique(self) -> bool {
        !matches!(self, KeyKind::Plain)
    }
}

/// A physical index: primary key, unique constraint or plain index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub kind: KeyKind,
    /// Field names, in index order.
    pub fields: Vec<String>,
}

/// One column pairing of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyField {
    /// Column on the referencing table.
    pub local: String,
    /// Column on the referenced table.
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub target: String,
    pub fields: Vec<ForeignKeyField>,
    pub cascade: bool,
}

/// A managed (or merely known) table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub name: String,
    /// Revision of the declaration this state was built from.
    pub revision: String,
    pub fields: Vec<Field>,
    pub keys: Vec<Key>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Field populated from a sequence, on dialects without identity columns.
    pub seq_field: Option<String>,
    pub seq_name: Option<String>,
    pub trigger_name: Option<String>,
    /// Not owned by tabula: never altered, only used for its before-hooks.
    pub existing: bool,
    /// Before-hooks already executed against this table.
    pub befores: IndexSet<String>,
}

impl Table {
    /// A table that does not exist (yet, or any more).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A table owned by someone else.
    pub fn existing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            existing: true,
            ..Default::default()
        }
    }

    /// The state right after `CREATE TABLE`: columns only.
    pub fn created_from(desired: &Table) -> Self {
        Self {
            name: desired.name.clone(),
            revision: desired.revision.clone(),
            fields: desired.fields.clone(),
            existing: desired.existing,
            ..Default::default()
        }
    }

    /// A table with no columns that is not `existing` is absent.
    pub fn is_empty(&self) -> bool {
        !self.existing && self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn key(&self, name: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.name == name)
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|k| k.name == name)
    }

    /// Whether `key` on this table is the same index as `other_key` on
    /// `other`, column definitions included.
    pub fn key_matches(&self, key: &Key, other: &Table, other_key: &Key, uses_identity: bool) -> bool {
        key.name == other_key.name
            && key.kind == other_key.kind
            && key.fields.len() == other_key.fields.len()
            && key
                .fields
                .iter()
                .zip(&other_key.fields)
                .all(|(a, b)| columns_match(self.field(a), other.field(b), a, b, uses_identity))
    }

    /// Same as [`Table::key_matches`] for foreign keys.
    pub fn foreign_key_matches(
        &self,
        fk: &ForeignKey,
        other: &Table,
        other_fk: &ForeignKey,
        uses_identity: bool,
    ) -> bool {
        fk.name == other_fk.name
            && fk.target == other_fk.target
            && fk.cascade == other_fk.cascade
            && fk.fields.len() == other_fk.fields.len()
            && fk.fields.iter().zip(&other_fk.fields).all(|(a, b)| {
                a.remote == b.remote
                    && columns_match(
                        self.field(&a.local),
                        other.field(&b.local),
                        &a.local,
                        &b.local,
                        uses_identity,
                    )
            })
    }

    /// Check the naming invariants: index and foreign key names are unique.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = IndexSet::new();
        for key in &self.keys {
            if !seen.insert(key.name.as_str()) {
                return Err(SchemaError::DuplicateIndex {
                    table: self.name.clone(),
                    name: key.name.clone(),
                });
            }
        }
        let mut seen = IndexSet::new();
        for fk in &self.foreign_keys {
            if !seen.insert(fk.name.as_str()) {
                return Err(SchemaError::DuplicateForeignKey {
                    table: self.name.clone(),
                    name: fk.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn columns_match(
    a: Option<&Field>,
    b: Option<&Field>,
    a_name: &str,
    b_name: &str,
    uses_identity: bool,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_column(b, uses_identity),
        (None, None) => a_name == b_name,
        _ => false,
    }
}

/// A stored procedure or function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Proc {
    pub name: String,
    pub revision: String,
    /// Routine body; `None` when the routine does not exist in the database.
    pub body: Option<String>,
    pub is_function: bool,
    /// Run with `CALL` at the start of every upgrade.
    pub pre_upgrade_hook: bool,
    pub befores: IndexSet<String>,
}

impl Proc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether two routines have the same definition. Revision and executed
    /// hooks do not count.
    pub fn same_definition(&self, other: &Proc) -> bool {
        self.name == other.name
            && self.is_function == other.is_function
            && self.pre_upgrade_hook == other.pre_upgrade_hook
            && self.body == other.body
    }
}

/// Either kind of managed entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thing {
    Table(Table),
    Proc(Proc),
}

impl Thing {
    pub fn name(&self) -> &str {
        match self {
            Thing::Table(t) => &t.name,
            Thing::Proc(p) => &p.name,
        }
    }

    pub fn revision(&self) -> &str {
        match self {
            Thing::Table(t) => &t.revision,
            Thing::Proc(p) => &p.revision,
        }
    }

    pub fn set_revision(&mut self, revision: impl Into<String>) {
        match self {
            Thing::Table(t) => t.revision = revision.into(),
            Thing::Proc(p) => p.revision = revision.into(),
        }
    }

    pub fn befores(&self) -> &IndexSet<String> {
        match self {
            Thing::Table(t) => &t.befores,
            Thing::Proc(p) => &p.befores,
        }
    }

    pub fn befores_mut(&mut self) -> &mut IndexSet<String> {
        match self {
            Thing::Table(t) => &mut t.befores,
            Thing::Proc(p) => &mut p.befores,
        }
    }
}

/// When a before-hook runs relative to the migration's phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeforeHook {
    pub name: String,
    /// Phase name, e.g. `adding-fields`.
    pub phase: String,
    pub sql: String,
    /// Run on a from-scratch build.
    pub initially: bool,
    /// Run when upgrading an existing database.
    pub upgrade: bool,
}
