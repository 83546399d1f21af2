//! [`FieldSerializer`]: the per-column transform that encrypts on write and
//! decrypts on read.
//!
//! Attach it to a column with
//! [`ColumnDef::with_transform`](crate::store::ColumnDef::with_transform); the
//! table layer then runs it for that column on every row it persists or loads.

use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::{CipherCodec, FieldKind, FieldValue, StorageCell};
use crate::cryptor::{CallContext, Cryptor};
use crate::error::CodecError;
use crate::store::{FieldTransform, Value};

/// Transparent encryption for text and binary columns.
///
/// Holds only the shared cryptor handle, so one instance can serve any number
/// of concurrent row operations.
#[derive(Clone)]
pub struct FieldSerializer {
    codec: CipherCodec,
}

impl FieldSerializer {
    pub fn new(cryptor: Arc<dyn Cryptor>) -> Self {
        Self {
            codec: CipherCodec::new(cryptor),
        }
    }
}

impl std::fmt::Debug for FieldSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldSerializer")
    }
}

#[async_trait]
impl FieldTransform for FieldSerializer {
    /// Encrypt a column value, dispatching on its runtime type. Columns not
    /// declared text or binary are rejected, null included.
    async fn to_storage(
        &self,
        ctx: &CallContext,
        declared: FieldKind,
        value: Value,
    ) -> Result<Value, CodecError> {
        let plaintext = match value {
            Value::Null => FieldValue::Absent,
            Value::Text(text) => FieldValue::Text(text),
            Value::Blob(bytes) => FieldValue::Binary(bytes),
            other => return Err(CodecError::UnsupportedFieldType(other.type_name().into())),
        };
        Ok(cell_to_value(self.codec.encode(ctx, plaintext, declared).await?))
    }

    /// Decrypt a stored cell into a value of the column's declared type.
    async fn from_storage(
        &self,
        ctx: &CallContext,
        declared: FieldKind,
        stored: Value,
    ) -> Result<Value, CodecError> {
        let cell = match stored {
            Value::Null => StorageCell::Null,
            Value::Text(text) => StorageCell::Text(text),
            Value::Blob(bytes) => StorageCell::Binary(bytes),
            other => return Err(CodecError::UnsupportedFieldType(other.type_name().into())),
        };
        Ok(match self.codec.decode(ctx, cell, declared).await? {
            FieldValue::Absent => Value::Null,
            FieldValue::Text(text) => Value::Text(text),
            FieldValue::Binary(bytes) => Value::Blob(bytes),
        })
    }
}

fn cell_to_value(cell: StorageCell) -> Value {
    match cell {
        StorageCell::Null => Value::Null,
        StorageCell::Text(text) => Value::Text(text),
        StorageCell::Binary(bytes) => Value::Blob(bytes),
    }
}
