//! Configuration types for tabula.
//!
//! Loaded from `tabula.toml`. Relative paths are resolved against the
//! directory the file lives in.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tabula_sql::DialectKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Target database flavor.
    #[serde(default)]
    pub dialect: DialectKind,

    /// Connection string. `DATABASE_URL` is used when unset.
    pub database_url: Option<String>,

    /// Directory holding the cache records and lock files.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Utf8PathBuf,

    /// Directory holding `*.table.toml` and `*.proc.toml` declarations.
    #[serde(default = "default_definitions")]
    pub definitions: Utf8PathBuf,

    /// Schema prefix applied to every table and routine name.
    pub schema: Option<String>,

    /// Successful-build marker.
    pub stamp_file: Option<Utf8PathBuf>,

    /// Append every executed statement here.
    pub sql_log: Option<Utf8PathBuf>,

    /// Ignore all declared before-hooks.
    #[serde(default)]
    pub skip_before_hooks: bool,
}

fn default_cache_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".tabula-cache")
}

fn default_definitions() -> Utf8PathBuf {
    Utf8PathBuf::from("schema")
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Make every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Utf8Path) {
        let join = |p: &Utf8PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        self.cache_dir = join(&self.cache_dir);
        self.definitions = join(&self.definitions);
        self.stamp_file = self.stamp_file.as_ref().map(join);
        self.sql_log = self.sql_log.as_ref().map(join);
    }

    /// Turn a declared entity name into its SQL name, applying the schema
    /// prefix.
    pub fn sql_name(&self, name: &str) -> String {
        let name = name.replace(':', "_");
        match &self.schema {
            Some(schema) => format!("{schema}.{name}"),
            None => name,
        }
    }

    /// Prefix shared by every cache record this configuration owns.
    pub fn cache_prefix(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}."),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.dialect, DialectKind::Postgres);
        assert_eq!(config.cache_dir, ".tabula-cache");
        assert!(!config.skip_before_hooks);
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = Config::from_toml(
            r#"
dialect = "oracle"
schema = "app"
cache_dir = "/var/cache/tabula"
stamp_file = "build.stamp"
"#,
        )
        .unwrap();
        config.resolve_paths(Utf8Path::new("/work"));
        assert_eq!(config.dialect, DialectKind::Oracle);
        assert_eq!(config.cache_dir, "/var/cache/tabula");
        assert_eq!(config.definitions, "/work/schema");
        assert_eq!(config.stamp_file.as_deref(), Some(Utf8Path::new("/work/build.stamp")));
        assert_eq!(config.sql_name("blog:post"), "app.blog_post");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("dialekt = \"postgres\"").is_err());
    }
}
