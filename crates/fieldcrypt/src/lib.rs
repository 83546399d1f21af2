//! Transparent field-level encryption for table records, and a batched
//! migration engine for backfilling encrypted columns.
//!
//! Write path: a record column tagged with a [`FieldSerializer`] is encoded by
//! the [`CipherCodec`] through a pluggable [`Cryptor`] before the store sees it.
//! The read path runs the same steps in reverse. [`migrate`] drives batches of
//! records through a caller transform and back into the store.

pub mod codec;
pub mod cryptor;
pub mod error;
pub mod migration;
pub mod serializer;
pub mod store;

#[cfg(test)]
mod testutil;

pub use codec::{CipherCodec, FieldKind, FieldValue, StorageCell};
pub use cryptor::{CallContext, Cryptor, EncryptedValue, LocalCryptor, ObjectId};
pub use error::{CodecError, CryptorError};
pub use migration::{migrate, MigrationError, MigrationOptions, MigrationReport};
pub use serializer::FieldSerializer;
pub use store::{StoreError, Table};
