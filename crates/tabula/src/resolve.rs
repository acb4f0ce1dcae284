//! Declarations and the staged resolver that turns them into desired state.
//!
//! A table is resolved in three stages, each memoized per entity:
//!
//! 1. [`FieldStage`]: columns, primary key, sequencing.
//! 2. [`IndexStage`]: access patterns folded into named keys.
//! 3. [`ResolvedTable`]: foreign keys, located against the target's keys,
//!    plus before-hooks.
//!
//! Foreign keys only need their target at stage 2, so tables may reference
//! each other (or themselves) freely.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Deserialize;
use tabula_config::Config;
use tabula_schema::{
    AccessPattern, BeforeHook, Field, ForeignKey, ForeignKeyField, Key, KeyKind, Proc,
    SchemaError, Table, foreign_key_name, key_name, sequence_name, synthesize, trigger_name,
};
use tabula_sql::Dialect;

use crate::Error;
use crate::phase::Phase;

const TABLE_SUFFIX: &str = ".table.toml";
const PROC_SUFFIX: &str = ".proc.toml";

/// A `<name>.table.toml` file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TableDecl {
    /// Owned by someone else; only before-hooks apply.
    #[serde(default)]
    pub existing: bool,

    /// Earlier names, whose cache records this table takes over.
    #[serde(default)]
    pub renamed_from: Vec<String>,

    #[serde(default, rename = "field")]
    pub fields: Vec<FieldDecl>,

    pub primary_key: Option<PrimaryKeyDecl>,

    #[serde(default, rename = "get")]
    pub gets: Vec<GetDecl>,

    #[serde(default, rename = "reference")]
    pub references: Vec<ReferenceDecl>,

    #[serde(default, rename = "before")]
    pub befores: Vec<BeforeDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub identity: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimaryKeyDecl {
    pub fields: Vec<String>,
    /// Generate values for the (single) key field.
    #[serde(default)]
    pub sequenced: bool,
    pub name: Option<String>,
}

/// One way the table is looked up.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetDecl {
    pub name: Option<String>,
    pub fields: Vec<String>,
    /// Ordering of a multi-row lookup.
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default)]
    pub multi: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceDecl {
    pub target: String,
    /// `[local, remote]` column pairs.
    pub fields: Vec<(String, String)>,
    #[serde(default)]
    pub cascade: bool,
    /// Disambiguates several references to the same target.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeDecl {
    pub phase: String,
    pub name: String,
    pub sql: String,
    #[serde(default = "yes")]
    pub initially: bool,
    #[serde(default = "yes")]
    pub upgrade: bool,
}

fn yes() -> bool {
    true
}

/// A `<name>.proc.toml` file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProcDecl {
    /// Everything after the routine name in `CREATE PROCEDURE`.
    pub body: String,
    #[serde(default)]
    pub function: bool,
    /// Whether the routine lives in the database at all.
    #[serde(default)]
    pub stored: bool,
    #[serde(default)]
    pub pre_upgrade_hook: bool,
    #[serde(default, rename = "before")]
    pub befores: Vec<BeforeDecl>,
}

/// One declaration file.
#[derive(Debug, Clone)]
pub struct Declaration<T> {
    /// SQL name, schema prefix included.
    pub name: String,
    /// Name as declared, e.g. `blog:post`.
    pub declared: String,
    pub file: Option<Utf8PathBuf>,
    pub decl: T,
}

impl<T> Declaration<T> {
    /// File path for messages.
    pub fn display_file(&self) -> String {
        match &self.file {
            Some(f) => f.to_string(),
            None => self.declared.clone(),
        }
    }
}

/// Every declaration known to a run, keyed by SQL name.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    config: Config,
    tables: IndexMap<String, Declaration<TableDecl>>,
    procs: IndexMap<String, Declaration<ProcDecl>>,
}

impl Declarations {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            tables: IndexMap::new(),
            procs: IndexMap::new(),
        }
    }

    /// Load every declaration under the configured definitions directory.
    /// Subdirectories become `:`-separated name prefixes.
    pub fn load(config: &Config) -> Result<Self, Error> {
        let mut decls = Self::new(config);
        let root = config.definitions.clone();
        decls.scan(&root, &root)?;
        Ok(decls)
    }

    fn scan(&mut self, root: &Utf8Path, dir: &Utf8Path) -> Result<(), Error> {
        let mut entries = Vec::new();
        for entry in dir.read_dir_utf8().map_err(|e| Error::io(dir, e))? {
            let entry = entry.map_err(|e| Error::io(dir, e))?;
            entries.push(entry.path().to_path_buf());
        }
        entries.sort();

        for path in entries {
            if path.is_dir() {
                self.scan(root, &path)?;
                continue;
            }
            let Some(file_name) = path.file_name() else { continue };
            let (stem, is_table) = if let Some(stem) = file_name.strip_suffix(TABLE_SUFFIX) {
                (stem, true)
            } else if let Some(stem) = file_name.strip_suffix(PROC_SUFFIX) {
                (stem, false)
            } else {
                continue;
            };

            let mut declared = String::new();
            if let Some(parent) = path.parent().and_then(|p| p.strip_prefix(root).ok()) {
                for part in parent.components() {
                    declared.push_str(part.as_str());
                    declared.push(':');
                }
            }
            declared.push_str(stem);

            let text = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            if is_table {
                self.add_table(&declared, &text, Some(path.clone()))?;
            } else {
                self.add_proc(&declared, &text, Some(path.clone()))?;
            }
        }
        Ok(())
    }

    pub fn add_table(
        &mut self,
        declared: &str,
        toml_text: &str,
        file: Option<Utf8PathBuf>,
    ) -> Result<(), Error> {
        let decl: TableDecl = parse(declared, &file, toml_text)?;
        let name = self.config.sql_name(declared);
        self.tables.insert(
            name.clone(),
            Declaration {
                name,
                declared: declared.to_string(),
                file,
                decl,
            },
        );
        Ok(())
    }

    pub fn add_proc(
        &mut self,
        declared: &str,
        toml_text: &str,
        file: Option<Utf8PathBuf>,
    ) -> Result<(), Error> {
        let decl: ProcDecl = parse(declared, &file, toml_text)?;
        let name = self.config.sql_name(declared);
        self.procs.insert(
            name.clone(),
            Declaration {
                name,
                declared: declared.to_string(),
                file,
                decl,
            },
        );
        Ok(())
    }

    pub fn sql_name(&self, declared: &str) -> String {
        self.config.sql_name(declared)
    }

    pub fn table(&self, name: &str) -> Option<&Declaration<TableDecl>> {
        self.tables.get(name)
    }

    pub fn proc(&self, name: &str) -> Option<&Declaration<ProcDecl>> {
        self.procs.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Declaration<TableDecl>> {
        self.tables.values()
    }

    pub fn procs(&self) -> impl Iterator<Item = &Declaration<ProcDecl>> {
        self.procs.values()
    }

    /// Every declaration file on disk.
    pub fn files(&self) -> impl Iterator<Item = &Utf8Path> {
        self.tables
            .values()
            .filter_map(|d| d.file.as_deref())
            .chain(self.procs.values().filter_map(|d| d.file.as_deref()))
    }

    /// Whether `requested` (declared or SQL names; empty means all) selects
    /// the entity.
    pub fn is_requested<T>(&self, decl: &Declaration<T>, requested: &[String]) -> bool {
        requested.is_empty()
            || requested
                .iter()
                .any(|r| *r == decl.declared || *r == decl.name || self.sql_name(r) == decl.name)
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    declared: &str,
    file: &Option<Utf8PathBuf>,
    text: &str,
) -> Result<T, Error> {
    toml::from_str(text).map_err(|e| Error::Declaration {
        file: file
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_else(|| declared.to_string()),
        message: e.to_string(),
    })
}

/// Stage 1: columns and primary key.
#[derive(Debug, Clone)]
pub struct FieldStage {
    pub table: Table,
    pub primary_key: Vec<String>,
    pub primary_key_name: String,
}

/// Stage 2: keys named and attached.
#[derive(Debug, Clone)]
pub struct IndexStage {
    pub table: Table,
}

/// Stage 3: the complete desired table.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub table: Table,
    pub hooks: Vec<BeforeHook>,
    /// SQL names this table was previously known by.
    pub renamed_from: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedProc {
    pub proc: Proc,
    pub hooks: Vec<BeforeHook>,
}

/// Memoizing resolver from declarations to desired state.
#[derive(Debug, Default)]
pub struct Resolver {
    skip_before_hooks: bool,
    uses_sequences: bool,
    uses_triggers: bool,
    fields: HashMap<String, FieldStage>,
    indexes: HashMap<String, IndexStage>,
    tables: HashMap<String, ResolvedTable>,
    procs: HashMap<String, ResolvedProc>,
}

impl Resolver {
    pub fn new(skip_before_hooks: bool, dialect: &dyn Dialect) -> Self {
        Self {
            skip_before_hooks,
            uses_sequences: dialect.uses_sequences(),
            uses_triggers: dialect.uses_triggers(),
            ..Default::default()
        }
    }

    /// Forget everything resolved so far.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.indexes.clear();
        self.tables.clear();
        self.procs.clear();
    }

    pub fn fields(&mut self, decls: &Declarations, name: &str) -> Result<&FieldStage, Error> {
        if !self.fields.contains_key(name) {
            let stage = self.build_fields(decls, name)?;
            self.fields.insert(name.to_string(), stage);
        }
        Ok(&self.fields[name])
    }

    pub fn indexes(&mut self, decls: &Declarations, name: &str) -> Result<&IndexStage, Error> {
        if !self.indexes.contains_key(name) {
            let stage = self.build_indexes(decls, name)?;
            self.indexes.insert(name.to_string(), stage);
        }
        Ok(&self.indexes[name])
    }

    pub fn table(&mut self, decls: &Declarations, name: &str) -> Result<&ResolvedTable, Error> {
        if !self.tables.contains_key(name) {
            let resolved = self.build_table(decls, name)?;
            self.tables.insert(name.to_string(), resolved);
        }
        Ok(&self.tables[name])
    }

    pub fn proc(&mut self, decls: &Declarations, name: &str) -> Result<&ResolvedProc, Error> {
        if !self.procs.contains_key(name) {
            let resolved = self.build_proc(decls, name)?;
            self.procs.insert(name.to_string(), resolved);
        }
        Ok(&self.procs[name])
    }

    fn build_fields(&self, decls: &Declarations, name: &str) -> Result<FieldStage, Error> {
        let d = decls
            .table(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))?;
        let invalid = |message: String| Error::Declaration {
            file: d.display_file(),
            message,
        };

        let mut table = if d.decl.existing {
            Table::existing(name)
        } else {
            Table::new(name)
        };
        for f in &d.decl.fields {
            if table.field(&f.name).is_some() {
                return Err(invalid(format!("field {} declared twice", f.name)));
            }
            let mut field = Field::new(&f.name, &f.db_type, f.nullable);
            field.identity = f.identity;
            table.fields.push(field);
        }

        let (primary_key, primary_key_name) = match &d.decl.primary_key {
            None => (Vec::new(), String::new()),
            Some(pk) => {
                for f in &pk.fields {
                    if table.field(f).is_none() {
                        return Err(SchemaError::UnknownField {
                            table: name.to_string(),
                            field: f.clone(),
                        }
                        .into());
                    }
                }
                if pk.sequenced {
                    let [field] = pk.fields.as_slice() else {
                        return Err(invalid("a sequenced primary key has exactly one field".into()));
                    };
                    if let Some(f) = table.field_mut(field) {
                        f.identity = true;
                    }
                    if self.uses_sequences {
                        table.seq_field = Some(field.clone());
                        table.seq_name = Some(sibling(name, &sequence_name(name, field)));
                    }
                    if self.uses_triggers {
                        table.trigger_name = Some(sibling(name, &trigger_name(name, field)));
                    }
                }
                let pk_name = pk.name.clone().unwrap_or_else(|| pk.fields.join("_"));
                (pk.fields.clone(), pk_name)
            }
        };

        Ok(FieldStage {
            table,
            primary_key,
            primary_key_name,
        })
    }

    fn build_indexes(&mut self, decls: &Declarations, name: &str) -> Result<IndexStage, Error> {
        let FieldStage {
            mut table,
            primary_key,
            primary_key_name,
        } = self.fields(decls, name)?.clone();
        let Some(d) = decls.table(name) else {
            return Err(SchemaError::UnknownTable(name.to_string()).into());
        };
        if table.existing {
            return Ok(IndexStage { table });
        }

        let check = |field: &str| -> Result<(), Error> {
            if table.field(field).is_none() {
                return Err(SchemaError::UnknownField {
                    table: name.to_string(),
                    field: field.to_string(),
                }
                .into());
            }
            Ok(())
        };

        let mut uniques = Vec::new();
        let mut multis = Vec::new();
        if !primary_key.is_empty() {
            uniques.push(AccessPattern::from_partitions(
                key_name(KeyKind::Primary, name, &primary_key_name),
                true,
                [primary_key.clone()],
            )?);
        }
        for get in &d.decl.gets {
            for f in get.fields.iter().chain(&get.order_by) {
                check(f)?;
            }
            let get_name = get
                .name
                .clone()
                .unwrap_or_else(|| format!("by_{}", get.fields.join("_")));
            if get.multi {
                let mut partitions = vec![get.fields.clone()];
                partitions.extend(get.order_by.iter().map(|f| vec![f.clone()]));
                multis.push(AccessPattern::from_partitions(
                    key_name(KeyKind::Plain, name, &get_name),
                    false,
                    partitions,
                )?);
            } else {
                uniques.push(AccessPattern::from_partitions(
                    key_name(KeyKind::Unique, name, &get_name),
                    true,
                    [get.fields.clone()],
                )?);
            }
        }

        table.keys = synthesize(uniques, multis)
            .into_iter()
            .map(|p| Key {
                kind: KeyKind::from_name(&p.name),
                fields: p.fields().map(str::to_string).collect(),
                name: p.name,
            })
            .collect();
        table.validate()?;
        Ok(IndexStage { table })
    }

    fn build_table(&mut self, decls: &Declarations, name: &str) -> Result<ResolvedTable, Error> {
        let mut table = self.indexes(decls, name)?.table.clone();
        let Some(d) = decls.table(name) else {
            return Err(SchemaError::UnknownTable(name.to_string()).into());
        };
        let file = d.display_file();

        for r in &d.decl.references {
            let target = decls.sql_name(&r.target);
            if decls.table(&target).is_none() {
                return Err(SchemaError::UnknownTable(target).into());
            }
            let fk_name = foreign_key_name(name, &target, r.name.as_deref());
            let target_table = self.indexes(decls, &target)?.table.clone();
            if target_table.existing {
                return Err(Error::Declaration {
                    file,
                    message: format!("foreign key {fk_name} cannot target existing table {target}"),
                });
            }
            for (local, _) in &r.fields {
                if table.field(local).is_none() {
                    return Err(SchemaError::UnknownField {
                        table: name.to_string(),
                        field: local.clone(),
                    }
                    .into());
                }
            }

            let backing = target_table.keys.iter().find(|k| {
                k.kind.is_unique()
                    && k.fields.len() == r.fields.len()
                    && r.fields.iter().all(|(_, remote)| k.fields.contains(remote))
            });
            let Some(backing) = backing else {
                return Err(SchemaError::MissingBackingIndex {
                    table: name.to_string(),
                    fkey: fk_name,
                    target,
                    fields: r
                        .fields
                        .iter()
                        .map(|(_, remote)| remote.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                }
                .into());
            };

            // Pairs follow the backing key's column order.
            let fields = backing
                .fields
                .iter()
                .filter_map(|remote| {
                    r.fields.iter().find(|(_, rm)| rm == remote).map(|(local, remote)| {
                        ForeignKeyField {
                            local: local.clone(),
                            remote: remote.clone(),
                        }
                    })
                })
                .collect();
            table.foreign_keys.push(ForeignKey {
                name: fk_name,
                target,
                fields,
                cascade: r.cascade,
            });
        }
        table.validate()?;

        let hooks = self.hooks(&file, &d.decl.befores)?;
        let renamed_from = d
            .decl
            .renamed_from
            .iter()
            .map(|old| decls.sql_name(old))
            .collect();
        Ok(ResolvedTable {
            table,
            hooks,
            renamed_from,
        })
    }

    fn build_proc(&self, decls: &Declarations, name: &str) -> Result<ResolvedProc, Error> {
        let d = decls.proc(name).ok_or_else(|| Error::Declaration {
            file: name.to_string(),
            message: "no such routine".into(),
        })?;
        let file = d.display_file();

        // Skipping before-hooks also drops the stored flag, which in turn
        // makes any pre-upgrade hook invalid.
        let stored = d.decl.stored && !self.skip_before_hooks;
        if d.decl.pre_upgrade_hook && (d.decl.function || !stored) {
            return Err(Error::Declaration {
                file,
                message: "a pre-upgrade hook must be a stored procedure".into(),
            });
        }

        let proc = Proc {
            name: name.to_string(),
            revision: String::new(),
            body: stored.then(|| d.decl.body.clone()),
            is_function: d.decl.function,
            pre_upgrade_hook: d.decl.pre_upgrade_hook,
            befores: Default::default(),
        };
        let hooks = self.hooks(&file, &d.decl.befores)?;
        Ok(ResolvedProc { proc, hooks })
    }

    fn hooks(&self, file: &str, befores: &[BeforeDecl]) -> Result<Vec<BeforeHook>, Error> {
        let mut hooks = Vec::new();
        for b in befores {
            match Phase::from_name(&b.phase) {
                Some(phase) if phase.accepts_hooks() => {}
                _ => {
                    return Err(Error::Declaration {
                        file: file.to_string(),
                        message: format!("unknown before phase {} for {}", b.phase, b.name),
                    });
                }
            }
            if self.skip_before_hooks {
                continue;
            }
            hooks.push(BeforeHook {
                name: b.name.clone(),
                phase: b.phase.clone(),
                sql: b.sql.clone(),
                initially: b.initially,
                upgrade: b.upgrade,
            });
        }
        Ok(hooks)
    }
}

/// `name` in the same schema as `table`.
fn sibling(table: &str, name: &str) -> String {
    match table.rsplit_once('.') {
        Some((schema, _)) => format!("{schema}.{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_sql::{Oracle, Postgres};

    fn config() -> Config {
        Config::from_toml("schema = \"app\"").unwrap()
    }

    fn decls() -> Declarations {
        let mut decls = Declarations::new(&config());
        decls
            .add_table(
                "user",
                r#"
[[field]]
name = "id"
type = "integer"

[[field]]
name = "email"
type = "varchar(200)"

[[field]]
name = "name"
type = "text"
nullable = true

[primary_key]
fields = ["id"]
sequenced = true

[[get]]
fields = ["email"]

[[get]]
name = "by_email_ordered"
fields = ["email"]
order_by = ["name"]
multi = true

[[get]]
fields = ["name"]
multi = true
"#,
                None,
            )
            .unwrap();
        decls
            .add_table(
                "blog:post",
                r#"
[[field]]
name = "id"
type = "integer"

[[field]]
name = "author_id"
type = "integer"

[primary_key]
fields = ["id"]

[[reference]]
target = "user"
fields = [["author_id", "id"]]
cascade = true

[[before]]
phase = "adding-fields"
name = "backfill"
sql = "UPDATE app.blog_post SET author_id = 1"
initially = false
"#,
                None,
            )
            .unwrap();
        decls
    }

    #[test]
    fn test_index_stage_merges_patterns() {
        let decls = decls();
        let mut resolver = Resolver::new(false, &Postgres);
        let table = &resolver.indexes(&decls, "app.user").unwrap().table;

        // The unique lookup on email absorbs the ordered multi lookup.
        assert_eq!(table.keys.len(), 3);
        assert_eq!(table.keys[0].kind, KeyKind::Primary);
        assert_eq!(table.keys[0].fields, vec!["id"]);
        assert_eq!(table.keys[1].kind, KeyKind::Unique);
        assert_eq!(table.keys[1].fields, vec!["email"]);
        assert_eq!(table.keys[2].kind, KeyKind::Plain);
        assert_eq!(table.keys[2].fields, vec!["name"]);
        assert!(table.field("id").unwrap().identity);
        assert_eq!(table.seq_name, None);
    }

    #[test]
    fn test_sequences_on_oracle() {
        let decls = decls();
        let mut resolver = Resolver::new(false, &Oracle);
        let table = &resolver.fields(&decls, "app.user").unwrap().table;
        assert_eq!(table.seq_field.as_deref(), Some("id"));
        assert!(table.seq_name.as_deref().unwrap().starts_with("app.sq_"));
        assert!(table.trigger_name.as_deref().unwrap().starts_with("app.sqt_"));
    }

    #[test]
    fn test_foreign_key_finds_backing_key() {
        let decls = decls();
        let mut resolver = Resolver::new(false, &Postgres);
        let resolved = resolver.table(&decls, "app.blog_post").unwrap();
        let fk = &resolved.table.foreign_keys[0];
        assert_eq!(fk.target, "app.user");
        assert_eq!(fk.name, foreign_key_name("app.blog_post", "app.user", None));
        assert!(fk.cascade);
        assert_eq!(resolved.hooks.len(), 1);
        assert!(!resolved.hooks[0].initially);
        assert!(resolved.hooks[0].upgrade);
    }

    #[test]
    fn test_missing_backing_key_is_invariant_violation() {
        let mut decls = decls();
        decls
            .add_table(
                "comment",
                r#"
[[field]]
name = "author_name"
type = "text"

[[reference]]
target = "user"
fields = [["author_name", "name"]]
"#,
                None,
            )
            .unwrap();
        let mut resolver = Resolver::new(false, &Postgres);
        assert!(matches!(
            resolver.table(&decls, "app.comment"),
            Err(Error::Invariant(SchemaError::MissingBackingIndex { .. }))
        ));
    }

    #[test]
    fn test_trigger_phase_rejects_hooks() {
        let mut decls = Declarations::new(&config());
        decls
            .add_table(
                "t",
                r#"
[[field]]
name = "id"
type = "integer"

[[before]]
phase = "adding-triggers"
name = "nope"
sql = "SELECT 1"
"#,
                None,
            )
            .unwrap();
        let mut resolver = Resolver::new(false, &Postgres);
        assert!(matches!(resolver.table(&decls, "app.t"), Err(Error::Declaration { .. })));
    }

    #[test]
    fn test_skip_before_hooks_drops_stored_flag() {
        let mut decls = Declarations::new(&config());
        decls
            .add_proc("touch", "body = \"() AS $$ SELECT 1 $$ LANGUAGE sql\"\nstored = true", None)
            .unwrap();
        decls
            .add_proc(
                "migrate",
                "body = \"() AS $$ SELECT 1 $$ LANGUAGE sql\"\nstored = true\npre_upgrade_hook = true",
                None,
            )
            .unwrap();

        let mut resolver = Resolver::new(false, &Postgres);
        assert!(resolver.proc(&decls, "app.touch").unwrap().proc.body.is_some());
        assert!(resolver.proc(&decls, "app.migrate").is_ok());

        let mut resolver = Resolver::new(true, &Postgres);
        assert_eq!(resolver.proc(&decls, "app.touch").unwrap().proc.body, None);
        assert!(matches!(resolver.proc(&decls, "app.migrate"), Err(Error::Declaration { .. })));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("blog")).unwrap();
        std::fs::write(root.join("blog/post.table.toml"), "[[field]]\nname = \"id\"\ntype = \"integer\"\n").unwrap();
        std::fs::write(root.join("touch.proc.toml"), "body = \"x\"\n").unwrap();
        std::fs::write(root.join("README.md"), "ignored").unwrap();

        let mut config = config();
        config.definitions = root;
        let decls = Declarations::load(&config).unwrap();
        let post = decls.table("app.blog_post").unwrap();
        assert_eq!(post.declared, "blog:post");
        assert!(decls.proc("app.touch").is_some());
        assert_eq!(decls.files().count(), 2);
        assert!(decls.is_requested(post, &["blog:post".to_string()]));
        assert!(!decls.is_requested(post, &["touch".to_string()]));
    }
}
