//! Table schemas and the per-column transform hook.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{StoreError, Value};
use crate::codec::FieldKind;
use crate::cryptor::CallContext;
use crate::error::CodecError;

/// A value transform attached to one column at schema definition time.
///
/// The table layer calls [`FieldTransform::to_storage`] on every value it
/// writes to the column and [`FieldTransform::from_storage`] on every value
/// it reads back. Errors abort the whole enclosing read or write.
#[async_trait]
pub trait FieldTransform: Send + Sync {
    async fn to_storage(
        &self,
        ctx: &CallContext,
        declared: FieldKind,
        value: Value,
    ) -> Result<Value, CodecError>;

    async fn from_storage(
        &self,
        ctx: &CallContext,
        declared: FieldKind,
        stored: Value,
    ) -> Result<Value, CodecError>;
}

/// Definition of a single column.
#[derive(Clone)]
pub struct ColumnDef {
    name: String,
    kind: FieldKind,
    primary_key: bool,
    transform: Option<Arc<dyn FieldTransform>>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            transform: None,
        }
    }

    /// Mark this column as the table's primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Route every value of this column through `transform`.
    pub fn with_transform(mut self, transform: impl FieldTransform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn transform(&self) -> Option<&Arc<dyn FieldTransform>> {
        self.transform.as_ref()
    }
}

impl fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("primary_key", &self.primary_key)
            .field("transformed", &self.transform.is_some())
            .finish()
    }
}

/// The columns of one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_named(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary-key column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidSchema`] if no column is marked as primary key.
    pub fn primary_key(&self) -> Result<&ColumnDef, StoreError> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .ok_or_else(|| StoreError::InvalidSchema(format!("{}: no primary key", self.name)))
    }

    /// Check the schema is usable: unique column names and exactly one
    /// untransformed integer or text primary key.
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |msg: String| Err(StoreError::InvalidSchema(format!("{}: {msg}", self.name)));

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return invalid(format!("duplicate column {}", column.name));
            }
        }

        let keys: Vec<&ColumnDef> = self.columns.iter().filter(|c| c.primary_key).collect();
        match keys.as_slice() {
            [] => invalid("no primary key".into()),
            [key] if !matches!(key.kind, FieldKind::Integer | FieldKind::Text) => {
                invalid(format!("primary key {} must be integer or text", key.name))
            }
            [key] if key.transform.is_some() => {
                invalid(format!("primary key {} cannot be transformed", key.name))
            }
            [_] => Ok(()),
            _ => invalid("more than one primary key".into()),
        }
    }
}
