//! Typed views handed to code generation.
//!
//! Templates never see the model types directly; they get these flat,
//! serializable projections instead.

use serde::Serialize;

use crate::{BeforeHook, Proc, Table};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldView {
    pub name: String,
    pub db_type: String,
    pub nullable: bool,
    pub identity: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeyView {
    pub name: String,
    pub kind: &'static str,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ForeignKeyView {
    pub name: String,
    pub target: String,
    pub fields: Vec<(String, String)>,
    pub cascade: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BeforeView {
    pub name: String,
    pub phase: String,
    pub statement: String,
    pub initial: bool,
    pub upgrade: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableView {
    pub name: String,
    pub existing: bool,
    pub fields: Vec<FieldView>,
    pub keys: Vec<KeyView>,
    pub foreign_keys: Vec<ForeignKeyView>,
    pub sequence: Option<String>,
    pub befores: Vec<BeforeView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcView {
    pub name: String,
    pub is_function: bool,
    pub stored: bool,
    pub pre_upgrade_hook: bool,
    pub befores: Vec<BeforeView>,
}

/// One projected entity.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    Table(TableView),
    Proc(ProcView),
}

/// The interface a templating layer implements to receive projections.
pub trait TemplateSink {
    type Error;

    fn accept(&mut self, projection: &Projection) -> Result<(), Self::Error>;
}

fn befores(hooks: &[BeforeHook]) -> Vec<BeforeView> {
    hooks
        .iter()
        .map(|h| BeforeView {
            name: h.name.clone(),
            phase: h.phase.clone(),
            statement: h.sql.clone(),
            initial: h.initially,
            upgrade: h.upgrade,
        })
        .collect()
}

impl Projection {
    pub fn table(table: &Table, hooks: &[BeforeHook]) -> Self {
        Projection::Table(TableView {
            name: table.name.clone(),
            existing: table.existing,
            fields: table
                .fields
                .iter()
                .map(|f| FieldView {
                    name: f.name.clone(),
                    db_type: f.db_type.clone(),
                    nullable: f.nullable,
                    identity: f.identity,
                })
                .collect(),
            keys: table
                .keys
                .iter()
                .map(|k| KeyView {
                    name: k.name.clone(),
                    kind: k.kind.tag(),
                    fields: k.fields.clone(),
                })
                .collect(),
            foreign_keys: table
                .foreign_keys
                .iter()
                .map(|fk| ForeignKeyView {
                    name: fk.name.clone(),
                    target: fk.target.clone(),
                    fields: fk
                        .fields
                        .iter()
                        .map(|p| (p.local.clone(), p.remote.clone()))
                        .collect(),
                    cascade: fk.cascade,
                })
                .collect(),
            sequence: table.seq_name.clone(),
            befores: befores(hooks),
        })
    }

    pub fn proc(proc: &Proc, hooks: &[BeforeHook]) -> Self {
        Projection::Proc(ProcView {
            name: proc.name.clone(),
            is_function: proc.is_function,
            stored: proc.body.is_some(),
            pre_upgrade_hook: proc.pre_upgrade_hook,
            befores: befores(hooks),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Projection::Table(t) => &t.name,
            Projection::Proc(p) => &p.name,
        }
    }
}
