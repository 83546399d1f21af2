//! Row-selection predicates and scan queries.
//!
//! Filters are evaluated against the stored cells, before any column
//! transform runs. An `Eq` on an encrypted column therefore compares
//! ciphertext; `IsNull`/`NotNull` are the useful tests there.

use super::{Key, Row, Value};

/// A row predicate.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    #[default]
    All,
    IsNull(String),
    NotNull(String),
    Eq(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Filter::NotNull(column.into())
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut a), Filter::And(b)) => {
                a.extend(b);
                Filter::And(a)
            }
            (Filter::And(mut a), f) => {
                a.push(f);
                Filter::And(a)
            }
            (f, Filter::And(mut b)) => {
                b.insert(0, f);
                Filter::And(b)
            }
            (f, g) => Filter::And(vec![f, g]),
        }
    }

    /// Disjunction of `self` and `other`, flattening nested `Or`s.
    /// `All` on either side matches every row, so the result is `All`.
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, _) | (_, Filter::All) => Filter::All,
            (Filter::Or(mut a), Filter::Or(b)) => {
                a.extend(b);
                Filter::Or(a)
            }
            (Filter::Or(mut a), f) => {
                a.push(f);
                Filter::Or(a)
            }
            (f, Filter::Or(mut b)) => {
                b.insert(0, f);
                Filter::Or(b)
            }
            (f, g) => Filter::Or(vec![f, g]),
        }
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::IsNull(column) => row.get(column).is_null(),
            Filter::NotNull(column) => !row.get(column).is_null(),
            Filter::Eq(column, value) => row.get(column) == value,
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Filter::Not(filter) => !filter.matches(row),
        }
    }
}

/// A keyset-paginated read: rows matching `filter`, in primary-key order,
/// strictly after `after`, at most `limit` of them.
#[derive(Debug, Clone, Default)]
pub struct ScanQuery {
    pub filter: Filter,
    pub after: Option<Key>,
    pub limit: Option<usize>,
    /// Columns to return. The primary key is always returned.
    pub columns: Option<Vec<String>>,
}

impl ScanQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn after(mut self, key: Option<Key>) -> Self {
        self.after = key;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn columns(mut self, columns: Option<Vec<String>>) -> Self {
        self.columns = columns;
        self
    }
}
