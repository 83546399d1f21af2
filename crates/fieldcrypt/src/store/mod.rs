//! Storage-access layer: schemas, rows, and batched read/write primitives.
//!
//! # Responsibilities
//!
//! - [`RowStore`] is the boundary to the relational engine. It offers keyset
//!   scans and atomic multi-row writes, nothing more.
//! - [`Table`] binds a [`TableSchema`] to a store and runs each column's
//!   [`FieldTransform`] on the way in and out, which is where transparent
//!   encryption happens.
//! - [`MemoryStore`] is an in-process [`RowStore`] for tests and demos.
//!
//! # Module invariants
//!
//! - Every `RowStore` write call is atomic: all rows are applied or none.
//! - A field transform error aborts the whole read or write; no row is ever
//!   persisted with some columns transformed and others not.

pub mod filter;
pub mod memory;
pub mod schema;
pub mod table;
pub mod value;

pub use filter::{Filter, ScanQuery};
pub use memory::MemoryStore;
pub use schema::{ColumnDef, FieldTransform, TableSchema};
pub use table::{Batch, Table};
pub use value::{Key, Row, Value};

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::FieldKind;
use crate::error::CodecError;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table does not exist in the store.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A row or projection names a column the schema does not define.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    /// A value does not match its column's declared type.
    #[error("column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: FieldKind,
        found: &'static str,
    },

    /// An insert collided with an existing primary key.
    #[error("duplicate primary key {key} in table {table}")]
    DuplicateKey { table: String, key: String },

    /// A row carries no usable primary-key value.
    #[error("row in table {0} has no usable primary key")]
    MissingPrimaryKey(String),

    /// The schema is not usable.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The underlying engine failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A column transform failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Batched-read / batched-write primitives offered by a relational engine.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert new rows atomically. Fails if any key already exists.
    async fn insert(
        &self,
        table: &str,
        primary_key: &str,
        rows: Vec<Row>,
    ) -> Result<u64, StoreError>;

    /// Return rows matching `query` in primary-key order.
    async fn scan(
        &self,
        table: &str,
        primary_key: &str,
        query: &ScanQuery,
    ) -> Result<Vec<Row>, StoreError>;

    /// Upsert rows atomically, returning the number of rows written.
    ///
    /// With `columns`, only those columns are written into each row (existing
    /// cells in other columns are kept); without, each row replaces the
    /// stored one entirely.
    async fn save(
        &self,
        table: &str,
        primary_key: &str,
        rows: Vec<Row>,
        columns: Option<&[String]>,
    ) -> Result<u64, StoreError>;

    /// Remove every row matching `filter` atomically, returning the number
    /// of rows removed.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, StoreError>;
}

/// An application record type that maps to and from a [`Row`].
pub trait Record: Send + Sync + Sized {
    fn to_row(&self) -> Row;

    /// Build a record from a row. Absent columns read as null.
    fn from_row(row: &Row) -> Result<Self, StoreError>;
}
