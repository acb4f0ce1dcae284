//! SQL dialects.
//!
//! A [`Dialect`] maps each abstract migration operation to the literal SQL
//! statement for one database, and reports the facts about that database the
//! planner has to work around. Rendering is pure: nothing here touches a
//! connection.

use serde::Deserialize;
use tabula_schema::{Field, ForeignKey, Key, KeyKind, Proc, Table};

mod oracle;
pub use oracle::Oracle;

mod postgres;
pub use postgres::Postgres;

mod sqlserver;
pub use sqlserver::SqlServer;

/// Which dialect to use, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    SqlServer,
    Oracle,
}

impl DialectKind {
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Postgres => Box::new(Postgres),
            DialectKind::SqlServer => Box::new(SqlServer),
            DialectKind::Oracle => Box::new(Oracle),
        }
    }
}

/// Quote `ident` between `start` and `end`, doubling any embedded `end`.
///
/// # Example
/// ```
/// use tabula_sql::quote_ident;
/// assert_eq!(quote_ident("user", "\"", "\""), "\"user\"");
/// assert_eq!(quote_ident("bla\"h", "\"", "\""), "\"bla\"\"h\"");
/// assert_eq!(quote_ident("x]y", "[", "]"), "[x]]y]");
/// ```
pub fn quote_ident(ident: &str, start: &str, end: &str) -> String {
    if end.is_empty() {
        return format!("{start}{ident}");
    }
    let escaped = ident.replace(end, &format!("{end}{end}"));
    format!("{start}{escaped}{end}")
}

/// SQL rendering and capabilities of one target database.
///
/// Default methods render ANSI-ish DDL; dialects override what differs.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_start(&self) -> &'static str {
        "\""
    }

    fn quote_end(&self) -> &'static str {
        "\""
    }

    /// Quote a single identifier.
    fn q(&self, ident: &str) -> String {
        quote_ident(ident, self.quote_start(), self.quote_end())
    }

    /// Quote a possibly schema-qualified name, part by part.
    fn qualified(&self, name: &str) -> String {
        name.split('.').map(|part| self.q(part)).collect::<Vec<_>>().join(".")
    }

    // --- facts ---

    /// Identity columns can be added nullable and tightened afterwards.
    fn null_identity_supported(&self) -> bool {
        true
    }

    /// `CREATE OR REPLACE` works for routines, so changed routines need not
    /// be dropped first.
    fn create_or_replace_supported(&self) -> bool {
        true
    }

    /// Pause after each statement to let the server settle.
    fn sleep_after_statement(&self) -> bool {
        false
    }

    fn uses_sequences(&self) -> bool {
        false
    }

    fn uses_triggers(&self) -> bool {
        false
    }

    /// Whether identity-ness is part of a column's definition.
    fn uses_identity(&self) -> bool {
        true
    }

    /// Separator written between statements in the SQL log.
    fn command_separator(&self) -> Option<&'static str> {
        None
    }

    /// Whether a NOT NULL column of this type can be relaxed to NULL.
    fn can_relax_not_null(&self, _field: &Field) -> bool {
        true
    }

    // --- fields ---

    fn normal_column(&self, field: &Field, force_null: bool) -> String {
        let not = if force_null || field.nullable { "" } else { " NOT" };
        format!("{}{} NULL", field.db_type, not)
    }

    fn identity_column(&self, _table: &Table, field: &Field, force_null: bool) -> String {
        self.normal_column(field, force_null)
    }

    fn column(&self, table: &Table, field: &Field, force_null: bool) -> String {
        if field.identity {
            self.identity_column(table, field, force_null)
        } else {
            self.normal_column(field, force_null)
        }
    }

    /// Add a column. New columns are always created nullable where the
    /// dialect allows it.
    fn add_field(&self, table: &Table, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ADD {} {}",
            self.qualified(&table.name),
            self.q(&field.name),
            self.column(table, field, true)
        )
    }

    fn drop_field(&self, table: &str, field: &Field) -> String {
        format!("ALTER TABLE {} DROP COLUMN {}", self.qualified(table), self.q(&field.name))
    }

    fn alter_field(&self, table: &Table, field: &Field, force_null: bool) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            self.qualified(&table.name),
            self.q(&field.name),
            self.column(table, field, force_null)
        )
    }

    fn set_field_null(&self, table: &Table, field: &Field) -> String {
        self.alter_field(table, field, true)
    }

    /// Set nullability to whatever `field` says.
    fn set_field_nullability(&self, table: &Table, field: &Field) -> String {
        self.alter_field(table, field, false)
    }

    // --- tables ---

    fn create_table(&self, table: &Table) -> String {
        let mut sql = format!("CREATE TABLE {} (", self.qualified(&table.name));
        let mut sep = "";
        for field in &table.fields {
            sql.push_str(sep);
            sql.push_str("\n  ");
            sql.push_str(&self.q(&field.name));
            sql.push(' ');
            sql.push_str(&self.column(table, field, false));
            sep = ",";
        }
        sql.push(')');
        sql
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.qualified(table))
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", self.qualified(from), self.qualified(to))
    }

    // --- keys ---

    /// Name used to refer to an index in `CREATE INDEX`/`DROP INDEX`.
    fn index_name(&self, _table: &str, key: &Key) -> String {
        self.q(&key.name)
    }

    fn add_key(&self, table: &str, key: &Key) -> String {
        let columns = key.fields.iter().map(|f| self.q(f)).collect::<Vec<_>>().join(", ");
        match key.kind {
            KeyKind::Plain => format!(
                "CREATE INDEX {} ON {} ({})",
                self.index_name(table, key),
                self.qualified(table),
                columns
            ),
            KeyKind::Primary | KeyKind::Unique => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {} ({})",
                self.qualified(table),
                self.q(&key.name),
                if key.kind == KeyKind::Primary { "PRIMARY KEY" } else { "UNIQUE" },
                columns
            ),
        }
    }

    fn drop_key(&self, table: &str, key: &Key) -> String {
        match key.kind {
            KeyKind::Plain => format!("DROP INDEX {}", self.index_name(table, key)),
            KeyKind::Primary | KeyKind::Unique => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualified(table),
                self.q(&key.name)
            ),
        }
    }

    fn add_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        let local = fk.fields.iter().map(|f| self.q(&f.local)).collect::<Vec<_>>().join(", ");
        let remote = fk.fields.iter().map(|f| self.q(&f.remote)).collect::<Vec<_>>().join(", ");
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){}",
            self.qualified(table),
            self.q(&fk.name),
            local,
            self.qualified(&fk.target),
            remote,
            if fk.cascade { " ON DELETE CASCADE" } else { "" }
        )
    }

    fn drop_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        format!("ALTER TABLE {} DROP CONSTRAINT {}", self.qualified(table), self.q(&fk.name))
    }

    // --- sequences & triggers ---

    fn create_sequence(&self, sequence: &str) -> String {
        format!("CREATE SEQUENCE {}", self.qualified(sequence))
    }

    fn drop_sequence(&self, sequence: &str) -> String {
        format!("DROP SEQUENCE {}", self.qualified(sequence))
    }

    /// Trigger filling the sequenced field; `None` on dialects without one.
    fn create_trigger(&self, _table: &Table) -> Option<String> {
        None
    }

    fn drop_trigger(&self, _trigger: &str) -> Option<String> {
        None
    }

    // --- routines ---

    fn create_proc(&self, proc: &Proc) -> Option<String> {
        let body = proc.body.as_deref()?;
        Some(format!(
            "CREATE {}{} {} {}",
            if self.create_or_replace_supported() { "OR REPLACE " } else { "" },
            if proc.is_function { "FUNCTION" } else { "PROCEDURE" },
            self.qualified(&proc.name),
            body
        ))
    }

    fn drop_proc(&self, proc: &Proc) -> Option<String> {
        proc.body.as_ref()?;
        Some(format!(
            "DROP {} {}",
            if proc.is_function { "FUNCTION" } else { "PROCEDURE" },
            self.qualified(&proc.name)
        ))
    }

    fn execute_proc(&self, proc: &Proc) -> String {
        format!("CALL {}", self.qualified(&proc.name))
    }
}

#[cfg(test)]
mod tests;
