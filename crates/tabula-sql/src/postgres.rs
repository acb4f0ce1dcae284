use tabula_schema::{Field, Key, Proc, Table};

use crate::Dialect;

/// PostgreSQL.
///
/// Generated keys use identity columns, so sequences and triggers are never
/// managed separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    /// Identity columns are implicitly NOT NULL and reject an explicit NULL.
    fn null_identity_supported(&self) -> bool {
        false
    }

    fn identity_column(&self, _table: &Table, field: &Field, _force_null: bool) -> String {
        format!("{} GENERATED BY DEFAULT AS IDENTITY NOT NULL", field.db_type)
    }

    fn set_field_null(&self, table: &Table, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
            self.qualified(&table.name),
            self.q(&field.name)
        )
    }

    fn set_field_nullability(&self, table: &Table, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            self.qualified(&table.name),
            self.q(&field.name),
            if field.nullable { "DROP" } else { "SET" }
        )
    }

    fn alter_field(&self, table: &Table, field: &Field, _force_null: bool) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            self.qualified(&table.name),
            self.q(&field.name),
            field.db_type
        )
    }

    /// The new name cannot carry a schema; the table stays where it is.
    fn rename_table(&self, from: &str, to: &str) -> String {
        let to = to.rsplit_once('.').map_or(to, |(_, name)| name);
        format!("ALTER TABLE {} RENAME TO {}", self.qualified(from), self.q(to))
    }

    fn execute_proc(&self, proc: &Proc) -> String {
        format!("CALL {}()", self.qualified(&proc.name))
    }

    /// Indexes live in their table's schema.
    fn index_name(&self, table: &str, key: &Key) -> String {
        match table.rsplit_once('.') {
            Some((schema, _)) => format!("{}.{}", self.qualified(schema), self.q(&key.name)),
            None => self.q(&key.name),
        }
    }
}
