//! Deterministic names for generated database objects.
//!
//! Names are derived from stable hashes so that rerunning against an
//! unchanged declaration produces exactly the same object names.

use crate::KeyKind;

/// Short hex digest of `input`.
pub fn short_hash(input: &str) -> String {
    let hex = blake3::hash(input.as_bytes()).to_hex().to_string();
    hex[..8].to_string()
}

/// Name of the index built from access pattern `pattern` on `table`.
pub fn key_name(kind: KeyKind, table: &str, pattern: &str) -> String {
    format!("{}_{}_{}", kind.tag(), short_hash(table), short_hash(pattern))
}

/// Name of a foreign key from `table` to `target`, disambiguated by
/// `refname` when a table references the same target more than once.
pub fn foreign_key_name(table: &str, target: &str, refname: Option<&str>) -> String {
    match refname {
        Some(r) => format!("fk_{}_{}_{}", short_hash(table), short_hash(target), r),
        None => format!("fk_{}_{}", short_hash(table), short_hash(target)),
    }
}

pub fn sequence_name(table: &str, field: &str) -> String {
    format!("sq_{}_{}", short_hash(table), field)
}

pub fn trigger_name(table: &str, field: &str) -> String {
    format!("sqt_{}_{}", short_hash(table), field)
}
