//! Append-only log of executed statements.

use std::fs::{File, OpenOptions};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::Error;

/// Separator used when the dialect has none of its own.
const DEFAULT_SEPARATOR: &str = ";\n";

#[derive(Debug)]
pub struct SqlLog {
    path: Utf8PathBuf,
    file: File,
    separator: &'static str,
}

impl SqlLog {
    /// Open `path` for appending and mark the start of a run.
    pub fn open(path: &Utf8Path, separator: Option<&'static str>) -> Result<Self, Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        writeln!(file, "-- tabula run {}", jiff::Timestamp::now()).map_err(|e| Error::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            separator: separator.unwrap_or(DEFAULT_SEPARATOR),
        })
    }

    pub fn record(&mut self, sql: &str) -> Result<(), Error> {
        write!(self.file, "{sql}{}", self.separator).map_err(|e| Error::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_with_separator() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("applied.sql")).unwrap();

        let mut log = SqlLog::open(&path, None).unwrap();
        log.record("DROP TABLE a").unwrap();
        drop(log);
        let mut log = SqlLog::open(&path, Some("\r\nGO\r\n")).unwrap();
        log.record("DROP TABLE b").unwrap();
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.starts_with("--")).collect();
        assert_eq!(lines, vec!["DROP TABLE a;", "DROP TABLE b", "GO"]);
        assert_eq!(text.matches("-- tabula run").count(), 2);
    }
}
