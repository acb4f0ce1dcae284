//! The migration engine.
//!
//! A run takes the global lock, decides per entity whether it needs work,
//! pairs each chosen entity's cached state with its resolved desired state,
//! walks every [`Phase`] in order, then writes back what actually happened.
//!
//! ```ignore
//! let decls = Declarations::load(&config)?;
//! let store = FsCacheDir::open(&config.cache_dir)?;
//! let mut engine = Engine::new(config, decls, Box::new(store), user);
//! let summary = engine.run(&client, &RunOptions::default()).await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use tabula_config::Config;
use tabula_schema::{Projection, Table, Thing};
use tabula_sql::Dialect;

use crate::Error;
use crate::cache::{is_managed_table, parse_record, record_revision, write_thing};
use crate::changeset::ChangeSet;
use crate::lock::{Coordinator, Facts, LockKind, LockState, Outcome, decide};
use crate::phase::Phase;
use crate::prompt::{Console, Prompter};
use crate::resolve::{Declarations, Resolver};
use crate::revision::{FileState, RevisionControl, Unversioned};
use crate::sqllog::SqlLog;
use crate::stamp;
use crate::store::CacheDir;
use crate::traced::Connection;

mod apply;

/// Pause after each statement on dialects that need it.
const STATEMENT_SLEEP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Answer every prompt "yes"; fail instead of waiting for locks.
    pub force: bool,
    /// Also drop cached tables that are no longer declared.
    pub drop_tables: bool,
    /// Restrict the run to these entities. Empty means all.
    pub names: Vec<String>,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub statements: usize,
    /// Failed statements and other recorded failures, in order.
    pub failures: Vec<String>,
    /// The stamp file showed nothing had changed; no lock was taken.
    pub nothing_to_do: bool,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nothing_to_do {
            return write!(f, "Nothing to do.");
        }
        if self.failures.is_empty() {
            return write!(f, "All {} statements successful.", self.statements);
        }
        write!(f, "The following statements failed:")?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}

/// What the lock coordinator decided to hand over for processing.
struct Processing {
    cached: Option<String>,
    revision: String,
    unlock_when_done: bool,
}

/// One migration session.
///
/// All per-run state lives here, so several engines can run side by side in
/// one process. [`Engine::reset`] returns it to its freshly built state.
pub struct Engine {
    config: Config,
    config_path: Option<Utf8PathBuf>,
    dialect: Box<dyn Dialect>,
    declarations: Declarations,
    store: Box<dyn CacheDir>,
    revisions: Box<dyn RevisionControl>,
    prompter: Box<dyn Prompter>,
    user: String,
    resolver: Resolver,
    changes: Vec<ChangeSet>,
    failures: Vec<String>,
    statements: usize,
    upgrade: Option<bool>,
    aggressive: bool,
    force: bool,
    sql_log: Option<SqlLog>,
}

impl Engine {
    /// `user` is the lock token, see [`crate::lock::user_token`].
    pub fn new(
        config: Config,
        declarations: Declarations,
        store: Box<dyn CacheDir>,
        user: impl Into<String>,
    ) -> Self {
        let dialect = config.dialect.dialect();
        let resolver = Resolver::new(config.skip_before_hooks, dialect.as_ref());
        Self {
            config,
            config_path: None,
            dialect,
            declarations,
            store,
            revisions: Box::new(Unversioned),
            prompter: Box::new(Console),
            user: user.into(),
            resolver,
            changes: Vec::new(),
            failures: Vec::new(),
            statements: 0,
            upgrade: None,
            aggressive: false,
            force: false,
            sql_log: None,
        }
    }

    pub fn with_revisions(mut self, revisions: Box<dyn RevisionControl>) -> Self {
        self.revisions = revisions;
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// The config file, checked against the stamp file.
    pub fn with_config_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    /// Change sets of the last run.
    pub fn changes(&self) -> &[ChangeSet] {
        &self.changes
    }

    /// Drop everything resolved and recorded so far.
    pub fn reset(&mut self) {
        self.resolver.clear();
        self.changes.clear();
        self.failures.clear();
        self.statements = 0;
        self.upgrade = None;
        self.aggressive = false;
        self.force = false;
        self.sql_log = None;
    }

    /// Typed views of the requested entities' desired state, for code
    /// generation.
    pub fn projections(&mut self, names: &[String]) -> Result<Vec<Projection>, Error> {
        let tables: Vec<String> = self
            .declarations
            .tables()
            .filter(|d| self.declarations.is_requested(d, names))
            .map(|d| d.name.clone())
            .collect();
        let procs: Vec<String> = self
            .declarations
            .procs()
            .filter(|d| self.declarations.is_requested(d, names))
            .map(|d| d.name.clone())
            .collect();

        let mut out = Vec::with_capacity(tables.len() + procs.len());
        for name in tables {
            let resolved = self.resolver.table(&self.declarations, &name)?;
            out.push(Projection::table(&resolved.table, &resolved.hooks));
        }
        for name in procs {
            let resolved = self.resolver.proc(&self.declarations, &name)?;
            out.push(Projection::proc(&resolved.proc, &resolved.hooks));
        }
        Ok(out)
    }

    /// Migrate the database behind `conn`.
    ///
    /// Per-entity failures are collected in the returned [`Summary`]. An
    /// `Err` means the run was aborted; the cache and locks are still written
    /// back before returning it.
    pub async fn run(&mut self, conn: &dyn Connection, options: &RunOptions) -> Result<Summary, Error> {
        self.reset();
        self.force = options.force;

        if let Some(stamp_file) = self.config.stamp_file.clone() {
            let inputs: Vec<Option<&Utf8Path>> = self
                .declarations
                .tables()
                .map(|d| d.file.as_deref())
                .chain(self.declarations.procs().map(|d| d.file.as_deref()))
                .chain([self.config_path.as_deref()])
                .collect();
            if stamp::nothing_to_do(&stamp_file, inputs) {
                tracing::info!(stamp = %stamp_file, "nothing changed since the last build");
                return Ok(Summary {
                    nothing_to_do: true,
                    ..Default::default()
                });
            }
            self.aggressive = !stamp_file.exists();
        }

        Coordinator::new(self.store.as_ref(), &self.user)
            .acquire_global(self.force, self.prompter.as_mut())?;
        let result = self.migrate(conn, options).await;
        if result.is_err() {
            // Whatever was not finished keeps its old revision and its lock.
            for cs in &mut self.changes {
                cs.success = false;
            }
        }
        let saved = self.save_cache();
        let released = Coordinator::new(self.store.as_ref(), &self.user).release_global();
        self.sql_log = None;

        result?;
        let complete = saved?;
        released?;

        if complete && self.failures.is_empty() {
            if let Some(stamp_file) = &self.config.stamp_file {
                stamp::touch(stamp_file)?;
            }
        }
        Ok(Summary {
            statements: self.statements,
            failures: self.failures.clone(),
            nothing_to_do: false,
        })
    }

    async fn migrate(&mut self, conn: &dyn Connection, options: &RunOptions) -> Result<(), Error> {
        self.upgrade = Coordinator::new(self.store.as_ref(), &self.user).previous_run_complete()?;
        if let Some(path) = &self.config.sql_log {
            self.sql_log = Some(SqlLog::open(path, self.dialect.command_separator())?);
        }

        self.load_tables(options)?;
        self.load_procs(options)?;
        let upgrade = *self.upgrade.get_or_insert(false);
        tracing::info!(
            upgrade,
            aggressive = self.aggressive,
            entities = self.changes.len(),
            "loaded change sets"
        );

        for phase in Phase::ALL {
            self.run_phase(conn, phase).await?;
        }
        Ok(())
    }

    fn is_upgrade(&self) -> bool {
        self.upgrade == Some(true)
    }

    /// Consult revision control and locks for one entity.
    fn should_process(
        &mut self,
        name: &str,
        file: Option<&Utf8Path>,
        display: &str,
    ) -> Result<Option<Processing>, Error> {
        let state = match file {
            Some(f) => self.revisions.state(f),
            None => FileState::NotVersioned,
        };
        let revision = match (file, state) {
            (Some(f), FileState::Modified | FileState::Unmodified) => self.revisions.revision(f),
            _ => String::new(),
        };

        let cached = self.store.read(name)?;
        if cached.is_some() && self.upgrade.is_none() {
            self.upgrade = Some(true);
        }
        let cached_revision = cached.as_deref().map(record_revision);
        let declared_at: Option<SystemTime> =
            file.and_then(|f| std::fs::metadata(f).and_then(|m| m.modified()).ok());
        let cache_stale = match (self.store.modified(name), declared_at) {
            (Some(cached_at), Some(declared_at)) => cached_at <= declared_at,
            _ => false,
        };

        let coordinator = Coordinator::new(self.store.as_ref(), &self.user);
        let lock = coordinator.lock(name, LockKind::Updating, false)?;
        let decision = decide(&Facts {
            name,
            file: display,
            state,
            revision: &revision,
            cached: cached_revision.as_deref(),
            cache_stale,
            lock: &lock,
            aggressive: self.aggressive,
            upgrade: self.upgrade,
        });

        let process = match &decision.outcome {
            Outcome::Process => true,
            Outcome::Skip => false,
            Outcome::Conflict(message) => {
                tracing::warn!(entity = name, "{message}");
                self.failures.push(message.clone());
                false
            }
        };

        if !process {
            tracing::info!(entity = name, ?lock, "skipping");
            if decision.unlock_when_done && !matches!(lock, LockState::ByOther(_)) {
                coordinator.unlock(name)?;
            }
            return Ok(None);
        }

        tracing::info!(
            entity = name,
            unlock_when_done = decision.unlock_when_done,
            "processing"
        );
        coordinator.lock(name, LockKind::Updating, true)?;
        Ok(Some(Processing {
            cached,
            revision,
            unlock_when_done: decision.unlock_when_done,
        }))
    }

    fn load_tables(&mut self, options: &RunOptions) -> Result<(), Error> {
        // Every declared table is known, requested or not, so drop-tables
        // mode never touches one.
        let mut known: HashSet<String> = self.declarations.tables().map(|d| d.name.clone()).collect();
        let requested: Vec<(String, Option<Utf8PathBuf>, String)> = self
            .declarations
            .tables()
            .filter(|d| self.declarations.is_requested(d, &options.names))
            .map(|d| (d.name.clone(), d.file.clone(), d.display_file()))
            .collect();

        for (name, file, display) in requested {
            let Some(processing) = self.should_process(&name, file.as_deref(), &display)? else {
                continue;
            };
            let resolved = self.resolver.table(&self.declarations, &name)?.clone();

            let mut current = match &processing.cached {
                Some(text) => Some(parse_record(&name, text)?),
                None => None,
            };
            // Every old name stays known, even past the one taken over.
            known.extend(resolved.renamed_from.iter().cloned());
            if current.is_none() {
                for old in &resolved.renamed_from {
                    if let Some(text) = self.store.read(old)? {
                        tracing::info!(entity = %name, from = %old, "taking over renamed table");
                        current = Some(parse_record(old, &text)?);
                        break;
                    }
                }
            }

            let mut desired = resolved.table;
            desired.revision = processing.revision;
            let existing = desired.existing;
            let mut cs = ChangeSet::new(current, Thing::Table(desired));
            cs.hooks = resolved.hooks;
            cs.unlock_when_done = processing.unlock_when_done;
            cs.file = display;
            if existing {
                if cs.current.is_none() {
                    cs.current = Some(cs.desired.clone());
                }
                cs.managed = false;
            }
            self.changes.push(cs);
        }

        if options.drop_tables {
            let prefix = self.config.cache_prefix();
            for name in self.store.list()? {
                if name.starts_with('_') || !name.starts_with(&prefix) || known.contains(&name) {
                    continue;
                }
                let Some(text) = self.store.read(&name)? else {
                    continue;
                };
                let current = parse_record(&name, &text)?;
                if !is_managed_table(&current) {
                    continue;
                }
                tracing::info!(entity = %name, "processing table for deletion");
                known.insert(name.clone());
                let mut cs = ChangeSet::new(Some(current), Thing::Table(Table::new(&name)));
                cs.unlock_when_done = true;
                cs.file = name;
                self.changes.push(cs);
            }
        }
        Ok(())
    }

    fn load_procs(&mut self, options: &RunOptions) -> Result<(), Error> {
        let requested: Vec<(String, Option<Utf8PathBuf>, String)> = self
            .declarations
            .procs()
            .filter(|d| self.declarations.is_requested(d, &options.names))
            .map(|d| (d.name.clone(), d.file.clone(), d.display_file()))
            .collect();

        for (name, file, display) in requested {
            let Some(processing) = self.should_process(&name, file.as_deref(), &display)? else {
                continue;
            };
            let resolved = self.resolver.proc(&self.declarations, &name)?.clone();
            let current = match &processing.cached {
                Some(text) => Some(parse_record(&name, text)?),
                None => None,
            };

            let mut desired = resolved.proc;
            desired.revision = processing.revision;
            let mut cs = ChangeSet::new(current, Thing::Proc(desired));
            cs.hooks = resolved.hooks;
            cs.unlock_when_done = processing.unlock_when_done;
            cs.file = display;
            self.changes.push(cs);
        }
        Ok(())
    }

    /// Send one statement on behalf of change set `idx`.
    ///
    /// Returns whether it succeeded. Nothing is sent for a change set that
    /// already failed. A failed `fatal` statement fails its change set.
    async fn execute_sql(&mut self, conn: &dyn Connection, idx: usize, sql: &str, fatal: bool) -> bool {
        if !self.changes[idx].success {
            return false;
        }
        self.statements += 1;
        let entity = self.changes[idx].name().to_string();
        tracing::info!(entity = %entity, "{sql}");

        loop {
            match conn.execute(sql).await {
                Ok(_) => {
                    if let Some(log) = &mut self.sql_log {
                        if let Err(e) = log.record(sql) {
                            tracing::warn!("could not append to sql log: {e}");
                        }
                    }
                    if self.dialect.sleep_after_statement() {
                        tokio::time::sleep(STATEMENT_SLEEP).await;
                    }
                    return true;
                }
                Err(e) => {
                    let retry = self.failures.is_empty()
                        && !self.force
                        && self.prompter.confirm(
                            &format!("SQL statement {} failed: {e}", truncate(sql, 100)),
                            "Try again?",
                        );
                    if retry {
                        continue;
                    }
                    tracing::error!(
                        entity = %entity,
                        file = %self.changes[idx].file,
                        fatal,
                        "statement failed: {e}"
                    );
                    if fatal {
                        self.changes[idx].success = false;
                        self.failures.push(sql.to_string());
                    }
                    return false;
                }
            }
        }
    }

    /// Ask before destroying data. Declining fails change set `idx`.
    fn confirm(&mut self, idx: usize, message: &str, summary: &str) -> bool {
        if !self.changes[idx].success {
            return false;
        }
        if self.force {
            return true;
        }
        let ok = self.prompter.confirm(message, "Are you sure?");
        if !ok {
            tracing::warn!(entity = self.changes[idx].name(), "declined: {summary}");
            self.changes[idx].success = false;
            self.failures.push(format!("Manual abort: {summary}"));
        }
        ok
    }

    /// Whether a hook is not meant for this kind of run.
    fn skips(&self, initially: bool, upgrade: bool) -> bool {
        if self.is_upgrade() { !upgrade } else { !initially }
    }

    /// Run the before-hooks scheduled for `phase`, once per entity.
    async fn before(&mut self, conn: &dyn Connection, phase: Phase) -> Result<(), Error> {
        for idx in 0..self.changes.len() {
            let hooks: Vec<_> = self.changes[idx]
                .hooks
                .iter()
                .filter(|h| h.phase == phase.name())
                .cloned()
                .collect();
            for hook in hooks {
                let skip = self.skips(hook.initially, hook.upgrade);
                let cs = &mut self.changes[idx];
                match cs.current.as_mut() {
                    // Nothing exists yet to run against: remember the hook as
                    // seen so it is recorded once the entity is created.
                    None if skip => {
                        cs.pending_befores.insert(hook.name);
                    }
                    None => {
                        return Err(Error::IllegalBefore {
                            entity: cs.name().to_string(),
                            hook: hook.name,
                        });
                    }
                    Some(current) if current.befores().contains(&hook.name) => {}
                    Some(current) if skip => {
                        current.befores_mut().insert(hook.name);
                    }
                    Some(_) => {
                        tracing::debug!(%phase, hook = %hook.name, "running before-hook");
                        if self.execute_sql(conn, idx, &hook.sql, true).await {
                            if let Some(current) = self.changes[idx].current.as_mut() {
                                current.befores_mut().insert(hook.name);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Write every change set's current state back to the cache and settle
    /// its lock. Returns whether every change set succeeded.
    fn save_cache(&mut self) -> Result<bool, Error> {
        let coordinator = Coordinator::new(self.store.as_ref(), &self.user);
        let mut complete = true;
        for cs in &mut self.changes {
            let desired_name = cs.desired.name().to_string();
            let Some(current) = cs.current.as_mut() else {
                if !cs.success {
                    complete = false;
                }
                continue;
            };
            if cs.success {
                current.set_revision(cs.desired.revision());
            }

            let name = current.name().to_string();
            if matches!(&*current, Thing::Table(t) if t.is_empty()) {
                self.store.delete(&name)?;
            } else {
                self.store.write(&name, &write_thing(current))?;
            }

            if cs.success {
                if cs.unlock_when_done {
                    coordinator.unlock(&desired_name)?;
                } else {
                    coordinator.lock(&desired_name, LockKind::Held, true)?;
                }
            } else {
                complete = false;
            }
        }
        coordinator.record_run(complete || self.is_upgrade())?;
        Ok(complete)
    }
}

fn truncate(sql: &str, max: usize) -> String {
    if sql.chars().count() <= max {
        return sql.to_string();
    }
    let head: String = sql.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("DROP TABLE a", 100), "DROP TABLE a");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_summary_display() {
        let ok = Summary {
            statements: 3,
            ..Default::default()
        };
        assert_eq!(ok.to_string(), "All 3 statements successful.");
        let failed = Summary {
            statements: 3,
            failures: vec!["DROP TABLE a".into(), "Manual abort: Drop field a.b".into()],
            nothing_to_do: false,
        };
        assert_eq!(
            failed.to_string(),
            "The following statements failed:\n  DROP TABLE a\n  Manual abort: Drop field a.b"
        );
        assert!(!failed.is_success());
    }
}
