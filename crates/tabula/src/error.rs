use tabula_schema::SchemaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache record {name}, line {line}: {message}")]
    CacheParse {
        name: String,
        line: usize,
        message: String,
    },

    #[error("malformed lock file {name}: {contents:?}")]
    MalformedLock { name: String, contents: String },

    #[error("migration in progress by someone else: could not create the lock file")]
    Locked,

    #[error("before-hook {hook} on {entity}: statements prior to table creation are allowed on upgrade only")]
    IllegalBefore { entity: String, hook: String },

    #[error("invalid declaration {file}: {message}")]
    Declaration { file: String, message: String },

    #[error(transparent)]
    Invariant(#[from] SchemaError),
}

impl Error {
    pub(crate) fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_string(),
            source,
        }
    }
}
