//! The cache directory.
//!
//! Holds one record per managed entity plus the lock and state files. Every
//! access goes through [`CacheDir`] so tests can run against a scratch
//! directory and a revision-controlled backend can hook in its own sync.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};

use crate::Error;

/// Name of the run-wide lock file.
pub const GLOBAL_LOCK: &str = "_lock";

/// Name of the file recording whether the last run completed.
pub const STATE_FILE: &str = "_state";

/// Name of the lock file for one entity.
pub fn entity_lock(name: &str) -> String {
    format!("{GLOBAL_LOCK}.{name}")
}

/// File primitives the engine needs from its cache directory.
pub trait CacheDir: Send + Sync {
    /// Contents of `name`, or `None` if it does not exist.
    fn read(&self, name: &str) -> Result<Option<String>, Error>;

    /// Create or overwrite `name`.
    fn write(&self, name: &str, contents: &str) -> Result<(), Error>;

    /// Atomically create `name`. Returns `false` if it already existed.
    fn create_new(&self, name: &str, contents: &str) -> Result<bool, Error>;

    /// Delete `name`. Deleting a missing file is not an error.
    fn delete(&self, name: &str) -> Result<(), Error>;

    fn rename(&self, from: &str, to: &str) -> Result<(), Error>;

    fn exists(&self, name: &str) -> bool;

    fn modified(&self, name: &str) -> Option<SystemTime>;

    /// Names of every regular file in the directory.
    fn list(&self) -> Result<Vec<String>, Error>;
}

/// A [`CacheDir`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsCacheDir {
    root: Utf8PathBuf,
}

impl FsCacheDir {
    /// Open `root`, creating it if needed.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }
}

impl CacheDir for FsCacheDir {
    fn read(&self, name: &str) -> Result<Option<String>, Error> {
        let path = self.path(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), Error> {
        let path = self.path(name);
        std::fs::write(&path, contents).map_err(|e| Error::io(path, e))
    }

    fn create_new(&self, name: &str, contents: &str) -> Result<bool, Error> {
        let path = self.path(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(Error::io(path, e)),
        };
        file.write_all(contents.as_bytes())
            .map_err(|e| Error::io(&path, e))?;
        Ok(true)
    }

    fn delete(&self, name: &str) -> Result<(), Error> {
        let path = self.path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), Error> {
        let from = self.path(from);
        std::fs::rename(&from, self.path(to)).map_err(|e| Error::io(from, e))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn modified(&self, name: &str) -> Option<SystemTime> {
        std::fs::metadata(self.path(name)).and_then(|m| m.modified()).ok()
    }

    fn list(&self) -> Result<Vec<String>, Error> {
        let entries = self.root.read_dir_utf8().map_err(|e| Error::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, FsCacheDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap();
        let store = FsCacheDir::open(root).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_new_is_exclusive() {
        let (_dir, store) = scratch();
        assert!(store.create_new(GLOBAL_LOCK, "").unwrap());
        assert!(!store.create_new(GLOBAL_LOCK, "").unwrap());
        store.delete(GLOBAL_LOCK).unwrap();
        assert!(store.create_new(GLOBAL_LOCK, "").unwrap());
    }

    #[test]
    fn test_read_write_rename_list() {
        let (_dir, store) = scratch();
        assert_eq!(store.read("app.users").unwrap(), None);
        store.write("app.users", "x").unwrap();
        store.rename("app.users", "app.people").unwrap();
        assert!(!store.exists("app.users"));
        assert_eq!(store.read("app.people").unwrap().as_deref(), Some("x"));
        store.write(&entity_lock("app.people"), "!me").unwrap();
        assert_eq!(store.list().unwrap(), vec!["_lock.app.people", "app.people"]);
        store.delete("nope").unwrap();
    }
}
