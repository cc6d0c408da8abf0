// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Abstract secondary-index contract (spec.md §4.3) and its B+-tree
//! implementation.

pub mod btree;

use crate::row::RowPointer;
use crate::schema::Value;

/// A composite index key: an ordered tuple of column values. Comparison is
/// lexicographic across components (spec.md §3).
#[derive(Clone, Debug, PartialEq)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    /// Wraps a tuple of values as a key.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// The first key component, used by every `search_condition` operator
    /// except those explicitly targeting a later component.
    #[must_use]
    pub fn first(&self) -> &Value {
        &self.0[0]
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp_key().partial_cmp(&b.cmp_key()) {
                Some(std::cmp::Ordering::Equal) => continue,
                other => return other,
            }
        }
        self.0.len().partial_cmp(&other.0.len())
    }
}

/// One `(key, row_pointer)` entry, as yielded by a lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    /// The entry's key
    pub key: IndexKey,
    /// The row this key refers to
    pub pointer: RowPointer,
}

/// A `(column, operator, operand)` predicate, dispatched on the first key
/// column per spec.md §4.3.1.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// Column this predicate targets
    pub column: String,
    /// Comparison operator
    pub operator: Operator,
    /// Right-hand side operand
    pub operand: Value,
}

/// Comparison operators supported by `search_condition`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl Operator {
    /// Evaluates `lhs <op> rhs` using the same total order as [`IndexKey`].
    #[must_use]
    pub fn apply(self, lhs: &Value, rhs: &Value) -> bool {
        let Some(ordering) = lhs.cmp_key().partial_cmp(&rhs.cmp_key()) else {
            return false;
        };
        use std::cmp::Ordering::{Equal, Greater, Less};
        match (self, ordering) {
            (Self::Eq, Equal) => true,
            (Self::Neq, Less | Greater) => true,
            (Self::Gt, Greater) => true,
            (Self::Gte, Greater | Equal) => true,
            (Self::Lt, Less) => true,
            (Self::Lte, Less | Equal) => true,
            _ => false,
        }
    }
}

/// Abstract secondary-index contract. Each implementation owns its own
/// [`crate::block_io::BlockIo`] over an index file.
///
/// `search`/`search_condition` return a lazily-advancing iterator (spec.md
/// §9 design note: implementations must not materialize the full result
/// set in memory) rather than a `Vec`; each `.next()` call reads at most
/// one more leaf block, and that read can fail, so the iterator yields
/// `crate::Result<IndexEntry>` rather than a bare `IndexEntry` (the same
/// fallible-iterator shape the teacher uses for its own disk-backed
/// scans). A unique-index collision is reported as `crate::Error::UniqueViolation`.
pub trait Index {
    /// Iterator type returned by `search`/`search_condition`.
    type Iter<'a>: Iterator<Item = crate::Result<IndexEntry>>
    where
        Self: 'a;

    /// Adds an entry. If the index is unique and an identical key already
    /// exists, fails without modifying the tree.
    fn insert(&mut self, key: IndexKey, pointer: RowPointer) -> crate::Result<()>;

    /// Removes all entries with `key`, or only the one matching
    /// `(key, specific_pointer)` if supplied. Returns the number removed.
    fn delete(&mut self, key: &IndexKey, specific_pointer: Option<RowPointer>) -> crate::Result<usize>;

    /// Equality scan, in ascending leaf order.
    fn search(&mut self, key: &IndexKey) -> crate::Result<Self::Iter<'_>>;

    /// Evaluates a `(column, operator, operand)` predicate.
    fn search_condition(&mut self, condition: &Condition) -> crate::Result<Self::Iter<'_>>;

    /// Bulk-loads by inserting one entry per row yielded by `rows`.
    fn build_index<I: IntoIterator<Item = (IndexKey, RowPointer)>>(&mut self, rows: I) -> crate::Result<()>;
}
