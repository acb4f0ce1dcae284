//! The per-phase operations.
//!
//! Each operation works out its statements from the current/desired pair
//! first, then sends them one by one, updating `current` only after each
//! statement succeeded.

use tabula_schema::{Field, ForeignKey, Key, Proc, Table, Thing};

use super::Engine;
use crate::Error;
use crate::phase::Phase;
use crate::traced::Connection;

/// Whether the sequence setup differs between current and desired.
fn sequence_changed(current: &Table, desired: &Table) -> bool {
    current.seq_field != desired.seq_field
        || current.seq_name != desired.seq_name
        || current.trigger_name != desired.trigger_name
}

impl Engine {
    pub(super) async fn run_phase(&mut self, conn: &dyn Connection, phase: Phase) -> Result<(), Error> {
        let applies = match phase {
            Phase::DroppingTriggers | Phase::AddingTriggers => self.dialect.uses_triggers(),
            Phase::DroppingSeqs | Phase::AddingSeqs => self.dialect.uses_sequences(),
            _ => true,
        };
        if !applies {
            return Ok(());
        }
        tracing::debug!(%phase, "phase");
        self.before(conn, phase).await?;

        match phase {
            Phase::PreUpgradeHooks => self.run_pre_upgrade_hooks(conn).await,
            Phase::DroppingStoredProcs => self.drop_procs(conn).await,
            Phase::DroppingTriggers => self.drop_triggers(conn).await,
            Phase::DroppingSeqs => self.drop_sequences(conn).await,
            Phase::DroppingForeignKeys => self.drop_foreign_keys(conn).await,
            Phase::DroppingIndexes => self.drop_keys(conn).await,
            Phase::AlteringFields => self.alter_fields(conn).await,
            Phase::DroppingChangedFields => self.drop_changed_fields(conn).await,
            Phase::SettingNull => self.set_fields_null(conn).await,
            Phase::RenamingTables => self.rename_tables(conn).await?,
            Phase::AddingTables => self.add_tables(conn).await,
            Phase::AddingFields => self.add_fields(conn).await,
            Phase::SettingNotNull => self.set_fields_not_null(conn).await,
            Phase::AddingIndexes => self.add_keys(conn).await,
            Phase::AddingForeignKeys => self.add_foreign_keys(conn).await,
            Phase::AddingSeqs => self.add_sequences(conn).await,
            Phase::AddingTriggers => self.add_triggers(conn).await,
            Phase::AddingStoredProcs => self.add_procs(conn).await,
            Phase::DroppingFields => self.drop_fields(conn).await,
            Phase::DroppingTables => self.drop_tables(conn).await,
            Phase::Finishing => {}
        }
        Ok(())
    }

    async fn run_pre_upgrade_hooks(&mut self, conn: &dyn Connection) {
        if !self.is_upgrade() {
            return;
        }
        for idx in 0..self.changes.len() {
            let cs = &self.changes[idx];
            let Some(current) = cs.current_proc() else { continue };
            if !cs.managed || current.body.is_none() || !current.pre_upgrade_hook {
                continue;
            }
            let sql = self.dialect.execute_proc(current);
            self.execute_sql(conn, idx, &sql, true).await;
        }
    }

    async fn drop_procs(&mut self, conn: &dyn Connection) {
        let replaceable = self.dialect.create_or_replace_supported();
        for idx in 0..self.changes.len() {
            let cs = &self.changes[idx];
            let (Some(current), Some(desired)) = (cs.current_proc(), cs.desired_proc()) else {
                continue;
            };
            if current.body.is_none()
                || !(desired.body.is_none() || (!replaceable && !desired.same_definition(current)))
            {
                continue;
            }
            let Some(sql) = self.dialect.drop_proc(current) else { continue };
            if self.execute_sql(conn, idx, &sql, true).await {
                if let Some(p) = self.changes[idx].current_proc_mut() {
                    p.body = None;
                }
            }
        }
    }

    async fn drop_triggers(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if current.seq_name.is_none() || !sequence_changed(current, desired) {
                continue;
            }
            let Some(sql) = current
                .trigger_name
                .as_deref()
                .and_then(|t| self.dialect.drop_trigger(t))
            else {
                continue;
            };
            if self.execute_sql(conn, idx, &sql, true).await {
                if let Some(t) = self.changes[idx].current_table_mut() {
                    t.trigger_name = None;
                }
            }
        }
    }

    async fn drop_sequences(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let Some(sequence) = &current.seq_name else { continue };
            // A sequence still fed into a trigger waits for the trigger.
            if !sequence_changed(current, desired)
                || current.trigger_name.is_some()
                || current.seq_name == desired.seq_name
            {
                continue;
            }
            let sql = self.dialect.drop_sequence(sequence);
            if self.execute_sql(conn, idx, &sql, true).await {
                if let Some(t) = self.changes[idx].current_table_mut() {
                    t.seq_name = None;
                    t.seq_field = None;
                }
            }
        }
    }

    // A foreign key whose backing key changes on a table outside this run is
    // not dropped here, and the key drop then fails. Run with every table
    // involved when changing a referenced key.
    async fn drop_foreign_keys(&mut self, conn: &dyn Connection) {
        let uses_identity = self.dialect.uses_identity();
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let drops: Vec<(String, ForeignKey)> = current
                .foreign_keys
                .iter()
                .filter(|fk| {
                    !desired
                        .foreign_key(&fk.name)
                        .is_some_and(|d| current.foreign_key_matches(fk, desired, d, uses_identity))
                })
                .map(|fk| (self.dialect.drop_foreign_key(&current.name, fk), fk.clone()))
                .collect();
            for (sql, fk) in drops {
                if self.execute_sql(conn, idx, &sql, true).await {
                    if let Some(t) = self.changes[idx].current_table_mut() {
                        t.foreign_keys.retain(|f| f.name != fk.name);
                    }
                }
            }
        }
    }

    async fn drop_keys(&mut self, conn: &dyn Connection) {
        let uses_identity = self.dialect.uses_identity();
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let drops: Vec<(String, Key)> = current
                .keys
                .iter()
                .filter(|k| {
                    !desired
                        .key(&k.name)
                        .is_some_and(|d| current.key_matches(k, desired, d, uses_identity))
                })
                .map(|k| (self.dialect.drop_key(&current.name, k), k.clone()))
                .collect();
            for (sql, key) in drops {
                if self.execute_sql(conn, idx, &sql, true).await {
                    if let Some(t) = self.changes[idx].current_table_mut() {
                        t.keys.retain(|k| k.name != key.name);
                    }
                }
            }
        }
    }

    /// Change column types in place. Failure is not fatal: the column is
    /// dropped and re-added by later phases instead.
    async fn alter_fields(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let alters: Vec<(String, Field)> = desired
                .fields
                .iter()
                .filter_map(|df| {
                    let cf = current.field(&df.name)?;
                    if cf.identity != df.identity || cf.db_type == df.db_type {
                        return None;
                    }
                    let altered = Field {
                        db_type: df.db_type.clone(),
                        ..cf.clone()
                    };
                    Some((self.dialect.alter_field(current, &altered, false), altered))
                })
                .collect();
            for (sql, altered) in alters {
                if self.execute_sql(conn, idx, &sql, false).await {
                    if let Some(cf) = self
                        .changes[idx]
                        .current_table_mut()
                        .and_then(|t| t.field_mut(&altered.name))
                    {
                        cf.db_type = altered.db_type;
                    }
                }
            }
        }
    }

    async fn drop_changed_fields(&mut self, conn: &dyn Connection) {
        let uses_identity = self.dialect.uses_identity();
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if desired.fields.is_empty() {
                continue;
            }
            let drops: Vec<Field> = current
                .fields
                .iter()
                .filter(|cf| match desired.field(&cf.name) {
                    Some(df) => !cf.same_column(df, uses_identity),
                    None => cf.identity,
                })
                .cloned()
                .collect();
            let table = current.name.clone();
            self.drop_columns(conn, idx, &table, drops).await;
        }
    }

    async fn set_fields_null(&mut self, conn: &dyn Connection) {
        let uses_identity = self.dialect.uses_identity();
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if desired.fields.is_empty() {
                continue;
            }
            let relaxes: Vec<(String, String)> = current
                .fields
                .iter()
                .filter(|cf| {
                    !cf.nullable
                        && desired
                            .field(&cf.name)
                            .is_none_or(|df| df.nullable || !cf.same_column(df, uses_identity))
                        && self.dialect.can_relax_not_null(cf)
                })
                .map(|cf| (self.dialect.set_field_null(current, cf), cf.name.clone()))
                .collect();
            for (sql, field) in relaxes {
                if self.execute_sql(conn, idx, &sql, true).await {
                    if let Some(cf) = self
                        .changes[idx]
                        .current_table_mut()
                        .and_then(|t| t.field_mut(&field))
                    {
                        cf.nullable = true;
                    }
                }
            }
        }
    }

    async fn rename_tables(&mut self, conn: &dyn Connection) -> Result<(), Error> {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if current.name == desired.name {
                continue;
            }
            let (from, to) = (current.name.clone(), desired.name.clone());
            let sql = self.dialect.rename_table(&from, &to);
            if self.execute_sql(conn, idx, &sql, true).await {
                if self.store.exists(&from) {
                    self.store.rename(&from, &to)?;
                }
                if let Some(t) = self.changes[idx].current_table_mut() {
                    t.name = to;
                }
            }
        }
        Ok(())
    }

    async fn add_tables(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let cs = &self.changes[idx];
            if !cs.managed || !cs.success || cs.current.is_some() {
                continue;
            }
            let Some(desired) = cs.desired_table() else { continue };
            let sql = self.dialect.create_table(desired);
            if self.execute_sql(conn, idx, &sql, true).await {
                let cs = &mut self.changes[idx];
                if let Some(desired) = cs.desired_table() {
                    let mut created = Table::created_from(desired);
                    created.befores.extend(cs.pending_befores.iter().cloned());
                    cs.current = Some(Thing::Table(created));
                }
            }
        }
    }

    /// New columns go in nullable; [`Phase::SettingNotNull`] tightens them.
    async fn add_fields(&mut self, conn: &dyn Connection) {
        let null_identity = self.dialect.null_identity_supported();
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let adds: Vec<(String, Field)> = desired
                .fields
                .iter()
                .filter(|df| current.field(&df.name).is_none())
                .map(|df| (self.dialect.add_field(desired, df), df.clone()))
                .collect();
            for (sql, mut field) in adds {
                if self.execute_sql(conn, idx, &sql, true).await {
                    field.nullable = !(field.identity && !null_identity);
                    if let Some(t) = self.changes[idx].current_table_mut() {
                        t.fields.push(field);
                    }
                }
            }
        }
    }

    async fn set_fields_not_null(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let changes: Vec<(String, Field)> = desired
                .fields
                .iter()
                .filter(|df| current.field(&df.name).is_some_and(|cf| cf.nullable != df.nullable))
                .map(|df| (self.dialect.set_field_nullability(desired, df), df.clone()))
                .collect();
            for (sql, df) in changes {
                if self.execute_sql(conn, idx, &sql, true).await {
                    if let Some(cf) = self
                        .changes[idx]
                        .current_table_mut()
                        .and_then(|t| t.field_mut(&df.name))
                    {
                        cf.nullable = df.nullable;
                    }
                }
            }
        }
    }

    async fn add_keys(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let adds: Vec<(String, Key)> = desired
                .keys
                .iter()
                .filter(|k| current.key(&k.name).is_none())
                .map(|k| (self.dialect.add_key(&desired.name, k), k.clone()))
                .collect();
            for (sql, key) in adds {
                if self.execute_sql(conn, idx, &sql, true).await {
                    if let Some(t) = self.changes[idx].current_table_mut() {
                        t.keys.push(key);
                    }
                }
            }
        }
    }

    async fn add_foreign_keys(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            let adds: Vec<(String, ForeignKey)> = desired
                .foreign_keys
                .iter()
                .filter(|fk| current.foreign_key(&fk.name).is_none())
                .map(|fk| (self.dialect.add_foreign_key(&desired.name, fk), fk.clone()))
                .collect();
            for (sql, fk) in adds {
                if self.execute_sql(conn, idx, &sql, true).await {
                    if let Some(t) = self.changes[idx].current_table_mut() {
                        t.foreign_keys.push(fk);
                    }
                }
            }
        }
    }

    async fn add_sequences(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if current.seq_name.is_some() {
                continue;
            }
            let Some(sequence) = &desired.seq_name else { continue };
            let sql = self.dialect.create_sequence(sequence);
            let (field, sequence) = (desired.seq_field.clone(), desired.seq_name.clone());
            if self.execute_sql(conn, idx, &sql, true).await {
                if let Some(t) = self.changes[idx].current_table_mut() {
                    t.seq_field = field;
                    t.seq_name = sequence;
                }
            }
        }
    }

    async fn add_triggers(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if desired.trigger_name.is_none()
                || current.trigger_name.is_some()
                || current.seq_name.is_none()
            {
                continue;
            }
            let Some(sql) = self.dialect.create_trigger(desired) else { continue };
            let trigger = desired.trigger_name.clone();
            if self.execute_sql(conn, idx, &sql, true).await {
                if let Some(t) = self.changes[idx].current_table_mut() {
                    t.trigger_name = trigger;
                }
            }
        }
    }

    async fn add_procs(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let cs = &self.changes[idx];
            if !cs.managed || !cs.success {
                continue;
            }
            let Some(desired) = cs.desired_proc() else { continue };
            if cs.current_proc().is_some_and(|c| c.same_definition(desired)) {
                continue;
            }
            // A routine without a body only needs its record updated.
            let created = match self.dialect.create_proc(desired) {
                Some(sql) => self.execute_sql(conn, idx, &sql, true).await,
                None => true,
            };
            if !created {
                continue;
            }

            let cs = &mut self.changes[idx];
            let Some(desired) = cs.desired_proc() else { continue };
            let mut proc: Proc = desired.clone();
            // Hooks already run against the old definition stay run.
            if let Some(old) = cs.current_proc() {
                proc.befores.extend(old.befores.iter().cloned());
            }
            proc.befores.extend(cs.pending_befores.iter().cloned());
            cs.current = Some(Thing::Proc(proc));
        }
    }

    async fn drop_fields(&mut self, conn: &dyn Connection) {
        let uses_identity = self.dialect.uses_identity();
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if desired.fields.is_empty() {
                continue;
            }
            let drops: Vec<Field> = current
                .fields
                .iter()
                .filter(|cf| {
                    !desired
                        .field(&cf.name)
                        .is_some_and(|df| cf.same_column(df, uses_identity))
                })
                .cloned()
                .collect();
            let table = current.name.clone();
            self.drop_columns(conn, idx, &table, drops).await;
        }
    }

    /// Drop columns after confirming each one.
    async fn drop_columns(&mut self, conn: &dyn Connection, idx: usize, table: &str, fields: Vec<Field>) {
        for field in fields {
            let message = format!(
                "About to drop field {table}.{}:\nAll data in this column will be lost!",
                field.name
            );
            let summary = format!("Drop field {table}.{}", field.name);
            if !self.confirm(idx, &message, &summary) {
                continue;
            }
            let sql = self.dialect.drop_field(table, &field);
            if self.execute_sql(conn, idx, &sql, true).await {
                if let Some(t) = self.changes[idx].current_table_mut() {
                    t.fields.retain(|f| f.name != field.name);
                }
            }
        }
    }

    async fn drop_tables(&mut self, conn: &dyn Connection) {
        for idx in 0..self.changes.len() {
            let Some((current, desired)) = self.changes[idx].tables() else { continue };
            if !desired.fields.is_empty() || current.fields.is_empty() {
                continue;
            }
            let table = current.name.clone();
            let message = format!("About to drop table {table}:\nAll data in this table will be lost!");
            if !self.confirm(idx, &message, &format!("Drop table {table}")) {
                continue;
            }
            let sql = self.dialect.drop_table(&table);
            if self.execute_sql(conn, idx, &sql, true).await {
                if let Some(t) = self.changes[idx].current_table_mut() {
                    t.fields.clear();
                    t.keys.clear();
                    t.foreign_keys.clear();
                    t.seq_field = None;
                    t.seq_name = None;
                    t.trigger_name = None;
                }
            }
        }
    }
}
