use tabula_schema::{Field, Key, Proc, Table};

use crate::Dialect;

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl Dialect for SqlServer {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_start(&self) -> &'static str {
        "["
    }

    fn quote_end(&self) -> &'static str {
        "]"
    }

    fn null_identity_supported(&self) -> bool {
        false
    }

    fn create_or_replace_supported(&self) -> bool {
        false
    }

    fn command_separator(&self) -> Option<&'static str> {
        Some("\r\nGO\r\n")
    }

    /// Relaxing `text`/`ntext` columns fails on SQL Server, so it is not
    /// attempted.
    fn can_relax_not_null(&self, field: &Field) -> bool {
        field.db_type != "text" && field.db_type != "ntext"
    }

    fn identity_column(&self, _table: &Table, field: &Field, _force_null: bool) -> String {
        format!("{} IDENTITY NOT NULL", field.db_type)
    }

    fn drop_key(&self, table: &str, key: &Key) -> String {
        if key.kind.is_unique() {
            format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualified(table),
                self.q(&key.name)
            )
        } else {
            format!("DROP INDEX {}.{}", self.qualified(table), self.q(&key.name))
        }
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        let short = to.rsplit('.').next().unwrap_or(to);
        format!("EXEC sp_rename '{}', '{}'", self.qualified(from), short)
    }

    fn execute_proc(&self, proc: &Proc) -> String {
        format!("EXEC {}", self.qualified(&proc.name))
    }
}
