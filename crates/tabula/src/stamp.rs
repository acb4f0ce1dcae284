//! The successful-build stamp file.
//!
//! Its absence puts the engine in aggressive mode. Its presence, newer than
//! every input, means there is nothing to do.

use std::fs::OpenOptions;
use std::time::SystemTime;

use camino::Utf8Path;

use crate::Error;

fn modified(path: &Utf8Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether the stamp is at least as new as every input. An input that is
/// not on disk (`None`, or missing) always counts as changed.
pub fn nothing_to_do<'a>(
    stamp: &Utf8Path,
    inputs: impl IntoIterator<Item = Option<&'a Utf8Path>>,
) -> bool {
    let Some(stamped) = modified(stamp) else {
        return false;
    };
    inputs.into_iter().all(|input| match input.and_then(modified) {
        Some(changed) => changed <= stamped,
        None => false,
    })
}

/// Create the stamp, or bump its modification time.
pub fn touch(stamp: &Utf8Path) -> Result<(), Error> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(stamp)
        .map_err(|e| Error::io(stamp, e))?;
    file.set_modified(SystemTime::now())
        .map_err(|e| Error::io(stamp, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::time::Duration;

    #[test]
    fn test_stamp_newer_than_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let input = root.join("user.table.toml");
        let stamp = root.join("build.stamp");
        std::fs::write(&input, "").unwrap();

        assert!(!nothing_to_do(&stamp, [Some(input.as_path())]));
        touch(&stamp).unwrap();
        assert!(nothing_to_do(&stamp, [Some(input.as_path())]));
        assert!(!nothing_to_do(&stamp, [Some(input.as_path()), None]));

        let later = SystemTime::now() + Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&input)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(!nothing_to_do(&stamp, [Some(input.as_path())]));
    }
}
