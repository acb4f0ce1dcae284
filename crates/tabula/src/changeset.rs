//! Per-entity bookkeeping for one run.

use indexmap::IndexSet;
use tabula_schema::{BeforeHook, Proc, Table, Thing};

/// The current/desired pair for one table or routine.
///
/// `current` is only ever changed after the statement that justifies the
/// change succeeded. Once `success` is cleared, later phases leave the change
/// set alone.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// What the database holds, as far as the cache knows. `None` if the
    /// entity does not exist yet.
    pub current: Option<Thing>,
    /// What it should hold. A table with no fields means "drop it".
    pub desired: Thing,
    /// Before-hooks declared for the entity.
    pub hooks: Vec<BeforeHook>,
    pub success: bool,
    pub unlock_when_done: bool,
    /// Hooks skipped or run while `current` did not exist yet; merged into
    /// `current` once it is created.
    pub pending_befores: IndexSet<String>,
    /// Whether phases apply to this entity. Existing tables and resolved
    /// dependencies that were not requested are carried but not managed.
    pub managed: bool,
    /// Declaration file, for messages.
    pub file: String,
}

impl ChangeSet {
    pub fn new(current: Option<Thing>, desired: Thing) -> Self {
        Self {
            current,
            desired,
            hooks: Vec::new(),
            success: true,
            unlock_when_done: false,
            pending_befores: IndexSet::new(),
            managed: true,
            file: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.desired.name()
    }

    pub fn desired_table(&self) -> Option<&Table> {
        match &self.desired {
            Thing::Table(t) => Some(t),
            Thing::Proc(_) => None,
        }
    }

    pub fn desired_proc(&self) -> Option<&Proc> {
        match &self.desired {
            Thing::Proc(p) => Some(p),
            Thing::Table(_) => None,
        }
    }

    pub fn current_table(&self) -> Option<&Table> {
        match &self.current {
            Some(Thing::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn current_table_mut(&mut self) -> Option<&mut Table> {
        match &mut self.current {
            Some(Thing::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn current_proc(&self) -> Option<&Proc> {
        match &self.current {
            Some(Thing::Proc(p)) => Some(p),
            _ => None,
        }
    }

    pub fn current_proc_mut(&mut self) -> Option<&mut Proc> {
        match &mut self.current {
            Some(Thing::Proc(p)) => Some(p),
            _ => None,
        }
    }

    /// A managed table change set that has not failed, with its current and
    /// desired tables.
    pub fn tables(&self) -> Option<(&Table, &Table)> {
        if !self.success || !self.managed {
            return None;
        }
        Some((self.current_table()?, self.desired_table()?))
    }
}
