//! Phase-ordered schema migrations.
//!
//! tabula keeps a cache record per table and routine describing what it last
//! put in the database. A run compares each record with the resolved
//! declaration and moves the database across in a fixed order of phases:
//! everything that removes or narrows first, everything that adds or widens
//! after. Cache records and lock files live in a shared directory so several
//! developers can migrate the same database without stepping on each other.

pub mod cache;
pub mod changeset;
pub mod engine;
mod error;
pub mod lock;
pub mod phase;
pub mod prompt;
pub mod resolve;
pub mod revision;
pub mod sqllog;
pub mod stamp;
pub mod store;
pub mod traced;

pub use changeset::ChangeSet;
pub use engine::{Engine, RunOptions, Summary};
pub use error::Error;
pub use lock::{Coordinator, LockState, user_token};
pub use phase::Phase;
pub use prompt::{Console, Fixed, Prompter};
pub use resolve::{Declarations, ProcDecl, Resolver, TableDecl};
pub use revision::{FileState, RevisionControl, Unversioned};
pub use store::{CacheDir, FsCacheDir};
pub use traced::{Connection, connect_postgres};

pub use tabula_config::Config;
pub use tabula_schema as schema;
pub use tabula_sql as sql;
