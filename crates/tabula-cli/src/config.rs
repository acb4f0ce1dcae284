//! Configuration file handling for tabula.
//!
//! Looks for `tabula.toml` in the current directory or any parent directory.

pub use tabula_config::Config;

use camino::{Utf8Path, Utf8PathBuf};

const CONFIG_FILE: &str = "tabula.toml";

/// Load configuration, from `explicit` if given, otherwise by searching up
/// from the current directory. Relative paths in the file are resolved
/// against its directory.
pub fn load(explicit: Option<&Utf8Path>) -> Result<(Config, Utf8PathBuf), ConfigError> {
    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
            let cwd = Utf8PathBuf::from_path_buf(cwd)
                .map_err(|p| ConfigError::Io(format!("non UTF-8 directory {}", p.display())))?;
            find_config_file(&cwd)?
        }
    };
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;

    let mut config = Config::from_toml(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    if let Some(base) = config_path.parent() {
        config.resolve_paths(base);
    }
    Ok((config, config_path))
}

/// Find `tabula.toml` by searching up the directory tree.
fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No `tabula.toml` found in any parent directory
    NotFound,
    /// I/O error reading the file
    Io(String),
    /// Parse error in the TOML file
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => {
                write!(f, "No {CONFIG_FILE} found in current directory or any parent")
            }
            ConfigError::Io(e) => write!(f, "Failed to read {CONFIG_FILE}: {e}"),
            ConfigError::Parse(e) => write!(f, "Failed to parse {CONFIG_FILE}: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_in_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let nested = root.join("schema/blog");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "schema = \"app\"\ncache_dir = \"cache\"\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, root.join(CONFIG_FILE));

        let (config, path) = load(Some(&found)).unwrap();
        assert_eq!(path, found);
        assert_eq!(config.cache_dir, root.join("cache"));
        assert_eq!(config.schema.as_deref(), Some("app"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join(CONFIG_FILE)).unwrap();
        std::fs::write(&path, "dialect = \"db2\"\n").unwrap();
        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse tabula.toml"));
    }
}
