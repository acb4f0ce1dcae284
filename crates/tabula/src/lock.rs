//! Advisory locking and the decision whether to process an entity.
//!
//! Locks are plain files in the cache directory. The global `_lock` is held
//! for the duration of a run; `_lock.<entity>` records who is working on one
//! entity and survives across runs while a local declaration is modified but
//! not yet committed.
//!
//! An entity lock contains one line: a marker (`!` while a run is updating
//! the entity, `~` while it is held across runs) followed by the user token
//! `user@host<sep>config-path`.

use std::cmp::Ordering;

use crate::Error;
use crate::prompt::Prompter;
use crate::revision::{FileState, compare_revisions};
use crate::store::{CacheDir, GLOBAL_LOCK, STATE_FILE, entity_lock};

const UPDATING: char = '!';
const HELD: char = '~';

/// Separator between the user and the config path in a lock token.
pub fn path_separator() -> char {
    if cfg!(windows) { ';' } else { ':' }
}

/// Build the token identifying this user and configuration.
pub fn user_token(user: &str, host: &str, config_path: &str) -> String {
    format!(
        "{}@{}{}{}",
        user.to_lowercase(),
        host.to_lowercase(),
        path_separator(),
        config_path
    )
}

/// How an entity lock was found when claiming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    NotLocked,
    /// We were in the middle of updating it.
    Updating,
    /// We hold it across runs.
    BySelf,
    /// Someone else holds it; carries their token.
    ByOther(String),
}

/// Which marker to write when claiming a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Updating,
    Held,
}

/// What to do with an entity this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Process,
    Skip,
    /// Skip, and record the message as a failure.
    Conflict(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    /// Release the entity lock after a successful run instead of keeping it.
    pub unlock_when_done: bool,
}

/// Everything the process decision depends on.
#[derive(Debug, Clone)]
pub struct Facts<'a> {
    pub name: &'a str,
    pub file: &'a str,
    pub state: FileState,
    /// Revision of the declaration, `""` unless its state is meaningful.
    pub revision: &'a str,
    /// Revision in the cache record, if there is one.
    pub cached: Option<&'a str>,
    /// The cache record is older than (or as old as) the declaration.
    pub cache_stale: bool,
    pub lock: &'a LockState,
    pub aggressive: bool,
    pub upgrade: Option<bool>,
}

/// Decide whether an entity should be migrated this run.
pub fn decide(facts: &Facts<'_>) -> Decision {
    let real_state = if facts.aggressive && facts.state == FileState::Unmodified {
        FileState::Modified
    } else {
        facts.state
    };
    let modified = facts.state.is_modified();
    let cmp = compare_revisions(facts.revision, facts.cached.unwrap_or(""));
    let has_cache = facts.cached.is_some();

    let outcome = match facts.lock {
        LockState::ByOther(holder) if modified && cmp != Ordering::Greater => Outcome::Conflict(format!(
            "{holder} is in the process of modifying {}. Please coordinate with that user.",
            facts.name
        )),
        LockState::NotLocked if modified && cmp == Ordering::Less => Outcome::Conflict(format!(
            "You have modified {}, but you do not have the latest version.",
            facts.file
        )),
        LockState::BySelf | LockState::Updating if cmp == Ordering::Less => Outcome::Conflict(format!(
            "You hold the lock on {} but your version of {} is outdated.",
            facts.name, facts.file
        )),
        LockState::ByOther(_) if !modified && has_cache => Outcome::Skip,
        LockState::NotLocked if !modified && has_cache && cmp != Ordering::Greater => {
            if facts.aggressive {
                Outcome::Process
            } else {
                Outcome::Skip
            }
        }
        LockState::NotLocked | LockState::BySelf if modified && cmp == Ordering::Equal => {
            if facts.aggressive || facts.upgrade == Some(true) || !has_cache || facts.cache_stale {
                Outcome::Process
            } else {
                Outcome::Skip
            }
        }
        _ => Outcome::Process,
    };

    Decision {
        outcome,
        unlock_when_done: matches!(
            real_state,
            FileState::Unmodified | FileState::NotVersioned | FileState::OutOfDate
        ),
    }
}

/// Claims and releases lock files on behalf of one user.
pub struct Coordinator<'a> {
    store: &'a dyn CacheDir,
    user: String,
}

impl<'a> Coordinator<'a> {
    pub fn new(store: &'a dyn CacheDir, user: impl Into<String>) -> Self {
        Self {
            store,
            user: user.into(),
        }
    }

    /// Take the run-wide lock. Contention asks whether to try again, unless
    /// `force` is set, in which case it fails straight away.
    pub fn acquire_global(&self, force: bool, prompter: &mut dyn Prompter) -> Result<(), Error> {
        loop {
            if self.store.create_new(GLOBAL_LOCK, &self.user)? {
                tracing::debug!("acquired global lock");
                return Ok(());
            }
            if force
                || !prompter.confirm("Migration in progress by someone else", "Try again?")
            {
                return Err(Error::Locked);
            }
        }
    }

    pub fn release_global(&self) -> Result<(), Error> {
        self.store.delete(GLOBAL_LOCK)
    }

    /// Whether the previous run completed, if there was one.
    pub fn previous_run_complete(&self) -> Result<Option<bool>, Error> {
        Ok(self.store.read(STATE_FILE)?.map(|s| s.trim() == "complete"))
    }

    pub fn record_run(&self, complete: bool) -> Result<(), Error> {
        self.store
            .write(STATE_FILE, if complete { "complete" } else { "incomplete" })
    }

    /// Claim the lock on `name`.
    ///
    /// Returns [`LockState::NotLocked`] if the lock was free (or `force` is
    /// set), in which case it is now ours with the given marker. Otherwise
    /// the lock is left alone and its holder reported.
    pub fn lock(&self, name: &str, kind: LockKind, force: bool) -> Result<LockState, Error> {
        let file = entity_lock(name);
        let marker = match kind {
            LockKind::Updating => UPDATING,
            LockKind::Held => HELD,
        };
        let contents = format!("{marker}{}", self.user);
        if force {
            self.store.write(&file, &contents)?;
            return Ok(LockState::NotLocked);
        }
        if self.store.create_new(&file, &contents)? {
            return Ok(LockState::NotLocked);
        }

        let found = self.store.read(&file)?.unwrap_or_default();
        let found = found.trim_end_matches(['\r', '\n']);
        let mut chars = found.chars();
        let Some(marker) = chars.next() else {
            return Err(Error::MalformedLock {
                name: file,
                contents: found.to_string(),
            });
        };
        let token = normalize_token(chars.as_str());
        if token != self.user {
            return Ok(LockState::ByOther(token));
        }
        match marker {
            UPDATING => Ok(LockState::Updating),
            HELD => Ok(LockState::BySelf),
            _ => Err(Error::MalformedLock {
                name: file,
                contents: found.to_string(),
            }),
        }
    }

    pub fn unlock(&self, name: &str) -> Result<(), Error> {
        self.store.delete(&entity_lock(name))
    }
}

/// Lowercase the `user@host` part of a token; the config path keeps its case.
fn normalize_token(token: &str) -> String {
    match token.find(path_separator()) {
        Some(pos) => format!("{}{}", token[..pos].to_lowercase(), &token[pos..]),
        None => token.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Fixed;
    use crate::store::FsCacheDir;
    use camino::Utf8PathBuf;

    fn scratch() -> (tempfile::TempDir, FsCacheDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, FsCacheDir::open(root).unwrap())
    }

    fn facts<'a>(state: FileState, revision: &'a str, cached: Option<&'a str>, lock: &'a LockState) -> Facts<'a> {
        Facts {
            name: "app.users",
            file: "schema/users.table.toml",
            state,
            revision,
            cached,
            cache_stale: false,
            lock,
            aggressive: false,
            upgrade: Some(true),
        }
    }

    #[test]
    fn test_user_token_lowercases_user_and_host() {
        let token = user_token("Alice", "Build-Box", "/Work/tabula.toml");
        assert!(token.starts_with("alice@build-box"));
        assert!(token.ends_with("/Work/tabula.toml"));
    }

    #[test]
    fn test_second_claimant_sees_other() {
        let (_dir, store) = scratch();
        let alice = Coordinator::new(&store, user_token("alice", "a", "/c"));
        let bob = Coordinator::new(&store, user_token("bob", "b", "/c"));

        assert_eq!(alice.lock("app.users", LockKind::Updating, false).unwrap(), LockState::NotLocked);
        let before = store.read(&entity_lock("app.users")).unwrap();
        assert!(matches!(
            bob.lock("app.users", LockKind::Updating, false).unwrap(),
            LockState::ByOther(holder) if holder == alice.user
        ));
        assert_eq!(store.read(&entity_lock("app.users")).unwrap(), before);
        assert_eq!(alice.lock("app.users", LockKind::Updating, false).unwrap(), LockState::Updating);

        alice.lock("app.users", LockKind::Held, true).unwrap();
        assert_eq!(alice.lock("app.users", LockKind::Updating, false).unwrap(), LockState::BySelf);
    }

    #[test]
    fn test_legacy_uppercase_token_is_ours() {
        let (_dir, store) = scratch();
        let me = Coordinator::new(&store, user_token("alice", "box", "/c"));
        store
            .write(&entity_lock("t"), &format!("~ALICE@BOX{}/c", path_separator()))
            .unwrap();
        assert_eq!(me.lock("t", LockKind::Updating, false).unwrap(), LockState::BySelf);
    }

    #[test]
    fn test_malformed_lock() {
        let (_dir, store) = scratch();
        let me = Coordinator::new(&store, "me");
        store.write(&entity_lock("t"), "?me").unwrap();
        assert!(matches!(me.lock("t", LockKind::Updating, false), Err(Error::MalformedLock { .. })));
    }

    #[test]
    fn test_global_lock_contention_under_force() {
        let (_dir, store) = scratch();
        let a = Coordinator::new(&store, "a");
        let b = Coordinator::new(&store, "b");
        a.acquire_global(true, &mut Fixed(false)).unwrap();
        assert!(matches!(b.acquire_global(true, &mut Fixed(true)), Err(Error::Locked)));
        a.release_global().unwrap();
        b.acquire_global(true, &mut Fixed(false)).unwrap();
    }

    #[test]
    fn test_state_marker() {
        let (_dir, store) = scratch();
        let c = Coordinator::new(&store, "me");
        assert_eq!(c.previous_run_complete().unwrap(), None);
        c.record_run(false).unwrap();
        assert_eq!(c.previous_run_complete().unwrap(), Some(false));
        c.record_run(true).unwrap();
        assert_eq!(c.previous_run_complete().unwrap(), Some(true));
    }

    #[test]
    fn test_decide_conflicts() {
        let other = LockState::ByOther("bob@b:/c".into());
        let d = decide(&facts(FileState::Modified, "1.2", Some("1.2"), &other));
        assert!(matches!(d.outcome, Outcome::Conflict(m) if m.starts_with("bob@b:/c")));

        let d = decide(&facts(FileState::Modified, "1.1", Some("1.2"), &LockState::NotLocked));
        assert!(matches!(d.outcome, Outcome::Conflict(m) if m.contains("latest version")));

        let d = decide(&facts(FileState::Unmodified, "1.1", Some("1.2"), &LockState::BySelf));
        assert!(matches!(d.outcome, Outcome::Conflict(m) if m.contains("outdated")));
    }

    #[test]
    fn test_decide_skip_and_process() {
        let d = decide(&facts(FileState::Unmodified, "1.2", Some("1.2"), &LockState::NotLocked));
        assert_eq!(d.outcome, Outcome::Skip);
        assert!(d.unlock_when_done);

        let mut f = facts(FileState::Unmodified, "1.2", Some("1.2"), &LockState::NotLocked);
        f.aggressive = true;
        let d = decide(&f);
        assert_eq!(d.outcome, Outcome::Process);
        assert!(!d.unlock_when_done);

        let d = decide(&facts(FileState::Unmodified, "1.3", Some("1.2"), &LockState::NotLocked));
        assert_eq!(d.outcome, Outcome::Process);

        let other = LockState::ByOther("bob".into());
        let d = decide(&facts(FileState::Unmodified, "1.2", Some("1.2"), &other));
        assert_eq!(d.outcome, Outcome::Skip);

        let d = decide(&facts(FileState::Modified, "1.2", None, &LockState::NotLocked));
        assert_eq!(d.outcome, Outcome::Process);
        assert!(!d.unlock_when_done);

        let mut f = facts(FileState::Modified, "1.2", Some("1.2"), &LockState::BySelf);
        f.upgrade = Some(false);
        assert_eq!(decide(&f).outcome, Outcome::Skip);
        f.cache_stale = true;
        assert_eq!(decide(&f).outcome, Outcome::Process);
    }
}
