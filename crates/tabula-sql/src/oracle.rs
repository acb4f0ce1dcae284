use tabula_schema::{Field, Table};

use crate::Dialect;

/// Oracle.
///
/// Identifiers are left unquoted. Generated keys come from a sequence filled
/// in by a `BEFORE INSERT` trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct Oracle;

impl Dialect for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote_start(&self) -> &'static str {
        ""
    }

    fn quote_end(&self) -> &'static str {
        ""
    }

    fn uses_sequences(&self) -> bool {
        true
    }

    fn uses_triggers(&self) -> bool {
        true
    }

    fn uses_identity(&self) -> bool {
        false
    }

    fn add_field(&self, table: &Table, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ADD ({} {})",
            self.qualified(&table.name),
            self.q(&field.name),
            self.column(table, field, true)
        )
    }

    fn drop_field(&self, table: &str, field: &Field) -> String {
        format!("ALTER TABLE {} DROP ({})", self.qualified(table), self.q(&field.name))
    }

    fn alter_field(&self, table: &Table, field: &Field, force_null: bool) -> String {
        format!(
            "ALTER TABLE {} MODIFY ({} {})",
            self.qualified(&table.name),
            self.q(&field.name),
            self.column(table, field, force_null)
        )
    }

    fn create_trigger(&self, table: &Table) -> Option<String> {
        let trigger = table.trigger_name.as_deref()?;
        let sequence = table.seq_name.as_deref()?;
        let field = self.q(table.seq_field.as_deref()?);
        Some(format!(
            "CREATE OR REPLACE TRIGGER {trigger}\n  BEFORE INSERT ON {table} FOR EACH ROW\n  BEGIN\n    IF :new.{field} IS NULL THEN\n      SELECT {sequence}.NEXTVAL\n        INTO :new.{field}\n        FROM dual;\n    END IF;\n  END;",
            trigger = self.qualified(trigger),
            table = self.qualified(&table.name),
            sequence = self.qualified(sequence),
        ))
    }

    fn drop_trigger(&self, trigger: &str) -> Option<String> {
        Some(format!("DROP TRIGGER {}", self.qualified(trigger)))
    }
}
