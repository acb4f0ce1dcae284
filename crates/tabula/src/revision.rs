//! Revision-control state of declaration files.

use std::cmp::Ordering;

use camino::Utf8Path;

/// Working-copy state of a declaration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unmodified,
    Modified,
    Added,
    Removed,
    NotVersioned,
    Conflicted,
    /// A newer revision exists upstream and the local copy is untouched.
    OutOfDate,
}

impl FileState {
    /// Whether the local copy differs from what is committed.
    pub fn is_modified(self) -> bool {
        !matches!(self, FileState::Unmodified | FileState::OutOfDate)
    }
}

/// Source of file states and revision strings.
///
/// Implementations may shell out to a version-control client; calls block.
pub trait RevisionControl: Send + Sync {
    fn state(&self, path: &Utf8Path) -> FileState;

    /// Dotted revision of the committed file, or `""` if unknown.
    fn revision(&self, path: &Utf8Path) -> String;
}

/// Declarations outside any version control.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unversioned;

impl RevisionControl for Unversioned {
    fn state(&self, _path: &Utf8Path) -> FileState {
        FileState::NotVersioned
    }

    fn revision(&self, _path: &Utf8Path) -> String {
        String::new()
    }
}

/// Compare dotted numeric revisions such as `1.12.2`.
///
/// Segments compare numerically; a missing segment sorts lowest, so `1.2`
/// is older than `1.2.1`. A non-numeric segment counts as zero.
pub fn compare_revisions(a: &str, b: &str) -> Ordering {
    if a.is_empty() {
        return if b.is_empty() { Ordering::Equal } else { Ordering::Less };
    }
    if b.is_empty() {
        return Ordering::Greater;
    }
    let (a_root, a_rest) = a.split_once('.').unwrap_or((a, ""));
    let (b_root, b_rest) = b.split_once('.').unwrap_or((b, ""));
    let a_root: u64 = a_root.trim().parse().unwrap_or(0);
    let b_root: u64 = b_root.trim().parse().unwrap_or(0);
    a_root.cmp(&b_root).then_with(|| compare_revisions(a_rest, b_rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_revisions() {
        assert_eq!(compare_revisions("", ""), Ordering::Equal);
        assert_eq!(compare_revisions("", "1.1"), Ordering::Less);
        assert_eq!(compare_revisions("1.1", ""), Ordering::Greater);
        assert_eq!(compare_revisions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_revisions("1.2", "1.2.1"), Ordering::Less);
        assert_eq!(compare_revisions("1.2.1", "1.2.1"), Ordering::Equal);
        assert_eq!(compare_revisions("2", "1.99"), Ordering::Greater);
    }

    #[test]
    fn test_modified_states() {
        assert!(!FileState::Unmodified.is_modified());
        assert!(!FileState::OutOfDate.is_modified());
        assert!(FileState::NotVersioned.is_modified());
        assert!(FileState::Conflicted.is_modified());
    }
}
