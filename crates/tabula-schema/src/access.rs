//! Access patterns and index synthesis.
//!
//! Every way a table is queried becomes an [`AccessPattern`]: the fields a
//! lookup filters on, then (for multi-row lookups) the fields it orders by.
//! Fields inside one partition may be reordered freely; fields may not move
//! across a partition boundary. [`synthesize`] folds the patterns into the
//! smallest set of indexes that still answers every lookup.

use crate::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPattern {
    pub name: String,
    pub unique: bool,
    partitions: Vec<Vec<String>>,
}

impl AccessPattern {
    pub fn new(name: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            unique,
            partitions: vec![Vec::new()],
        }
    }

    /// Build a pattern from partitions. Empty partitions are ignored.
    pub fn from_partitions<I, P, S>(
        name: impl Into<String>,
        unique: bool,
        partitions: I,
    ) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pattern = Self::new(name, unique);
        for partition in partitions {
            pattern.cut();
            for field in partition {
                pattern.push(field)?;
            }
        }
        Ok(pattern)
    }

    /// Add a field to the last partition.
    ///
    /// Returns `false` if it was already there. A field that already sits in
    /// an earlier partition is an error.
    pub fn push(&mut self, field: impl Into<String>) -> Result<bool, SchemaError> {
        let field = field.into();
        let (last, earlier) = match self.partitions.split_last_mut() {
            Some(split) => split,
            None => {
                self.partitions.push(vec![field]);
                return Ok(true);
            }
        };
        if last.contains(&field) {
            return Ok(false);
        }
        if earlier.iter().any(|p| p.contains(&field)) {
            return Err(SchemaError::FieldInTwoPartitions {
                pattern: self.name.clone(),
                field,
            });
        }
        last.push(field);
        Ok(true)
    }

    /// Start a new partition, unless the current one is still empty.
    pub fn cut(&mut self) {
        if self.partitions.last().is_none_or(|p| !p.is_empty()) {
            self.partitions.push(Vec::new());
        }
    }

    fn extend_last(&mut self, fields: Vec<String>) {
        match self.partitions.last_mut() {
            Some(last) => last.extend(fields),
            None => self.partitions.push(fields),
        }
    }

    /// Non-empty partitions, in order.
    pub fn partitions(&self) -> impl Iterator<Item = &[String]> {
        self.partitions
            .iter()
            .filter(|p| !p.is_empty())
            .map(Vec::as_slice)
    }

    /// All fields in index order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().flatten().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge two patterns into one that serves both, if such a pattern
    /// exists.
    ///
    /// Partitions are consumed in lock-step; fields shared by the current
    /// partitions on both sides go into the merged pattern. When both sides
    /// still have unshared fields at the same time, no single index ordering
    /// works for both and there is no merge.
    pub fn make_super(&self, other: &AccessPattern) -> Option<AccessPattern> {
        let mut merged = AccessPattern::new(String::new(), self.unique || other.unique);
        let mut ours = self.partitions().peekable();
        let mut theirs = other.partitions().peekable();
        let mut a: Vec<String> = Vec::new();
        let mut b: Vec<String> = Vec::new();

        while (!a.is_empty() || ours.peek().is_some()) && (!b.is_empty() || theirs.peek().is_some()) {
            if a.is_empty() {
                merged.cut();
                if let Some(p) = ours.next() {
                    a = p.to_vec();
                }
            }
            if b.is_empty() {
                merged.cut();
                if let Some(p) = theirs.next() {
                    b = p.to_vec();
                }
            }

            let mut unshared = Vec::with_capacity(a.len());
            for field in a.drain(..) {
                match b.iter().position(|f| *f == field) {
                    Some(pos) => {
                        b.remove(pos);
                        merged.extend_last(vec![field]);
                    }
                    None => unshared.push(field),
                }
            }
            a = unshared;

            if !a.is_empty() && !b.is_empty() {
                return None;
            }
        }

        // Trailing fields only go in when the other side is not unique: a
        // unique index on fewer fields already answers the longer lookup.
        merged.cut();
        if !other.unique && !a.is_empty() {
            merged.extend_last(a);
        }
        if !self.unique && !b.is_empty() {
            merged.extend_last(b);
        }
        if !other.unique {
            for p in ours {
                merged.cut();
                merged.extend_last(p.to_vec());
            }
        }
        if !self.unique {
            for p in theirs {
                merged.cut();
                merged.extend_last(p.to_vec());
            }
        }

        merged.partitions.retain(|p| !p.is_empty());
        if merged.partitions.is_empty() {
            merged.partitions.push(Vec::new());
        }
        merged.name = if merged.len() == self.len() {
            self.name.clone()
        } else {
            other.name.clone()
        };
        Some(merged)
    }
}

/// Fold `pattern` into `out`, merging it with the first pattern it can be
/// merged with. Returns `true` if anything was merged.
fn fold_into(out: &mut Vec<AccessPattern>, mut pattern: AccessPattern) -> bool {
    let mut merged_any = false;
    let mut i = 0;
    while i < out.len() {
        if let Some(merged) = out[i].make_super(&pattern) {
            merged_any = true;
            if out[i].len() >= pattern.len() {
                out[i] = merged;
                return true;
            }
            out.remove(i);
            pattern = merged;
            continue;
        }
        i += 1;
    }
    out.push(pattern);
    merged_any
}

/// Reduce unique patterns to an irredundant set.
///
/// Folding is repeated until a pass merges nothing, so no two outputs can be
/// merged with each other.
pub fn trim_uniques(uniques: Vec<AccessPattern>) -> Vec<AccessPattern> {
    let mut current = uniques;
    loop {
        let mut out: Vec<AccessPattern> = Vec::with_capacity(current.len());
        let mut merged_any = false;
        for pattern in current {
            merged_any |= fold_into(&mut out, pattern);
        }
        if !merged_any {
            return out;
        }
        current = out;
    }
}

/// Reduce multi-row patterns, absorbing them into unique patterns where
/// possible. `uniques` may be updated in place.
pub fn trim_multis(uniques: &mut [AccessPattern], multis: Vec<AccessPattern>) -> Vec<AccessPattern> {
    let mut out: Vec<AccessPattern> = Vec::with_capacity(multis.len());
    'next: for mut pattern in multis {
        for unique in uniques.iter_mut() {
            if let Some(merged) = unique.make_super(&pattern) {
                *unique = merged;
                continue 'next;
            }
        }

        let mut i = 0;
        while i < out.len() {
            if let Some(merged) = out[i].make_super(&pattern) {
                if out[i].len() >= pattern.len() {
                    out[i] = merged;
                    continue 'next;
                }
                out.remove(i);
                pattern = merged;
                continue;
            }
            i += 1;
        }
        out.push(pattern);
    }
    out
}

/// Compute the index set for a table: unique patterns first, then the
/// multi-row ones that could not be absorbed. Empty patterns are dropped.
pub fn synthesize(uniques: Vec<AccessPattern>, multis: Vec<AccessPattern>) -> Vec<AccessPattern> {
    let uniques = uniques.into_iter().filter(|p| !p.is_empty()).collect();
    let multis = multis.into_iter().filter(|p| !p.is_empty()).collect();
    let mut uniques = trim_uniques(uniques);
    let multis = trim_multis(&mut uniques, multis);
    uniques.extend(multis);
    uniques
}
