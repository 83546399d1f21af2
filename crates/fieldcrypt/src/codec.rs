//! Conversion between plaintext field values and encrypted storage cells.
//!
//! # Cell format
//!
//! ```text
//! binary cell: object_id (36 bytes) ‖ ciphertext body
//! text cell:   base64-standard(object_id ‖ ciphertext body)
//! ```
//!
//! This layout is the on-disk contract and must stay byte-for-byte stable.
//! The representation of a cell is chosen by the field's type, never by its
//! content.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::cryptor::{CallContext, Cryptor, EncryptedValue};
use crate::error::{CodecError, CryptorError};

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Binary,
    Integer,
    Real,
}

impl FieldKind {
    /// Whether fields of this kind can be encrypted.
    pub fn is_encryptable(self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::Binary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Binary => "binary",
            FieldKind::Integer => "integer",
            FieldKind::Real => "real",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plaintext field value. An empty string or byte vector is a value, not absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Absent,
    Text(String),
    Binary(Vec<u8>),
}

/// The physical value persisted for an encrypted column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCell {
    Null,
    Text(String),
    Binary(Vec<u8>),
}

/// Encrypts and decrypts field values through a shared [`Cryptor`].
///
/// Cheap to clone; holds no state besides the cryptor handle.
#[derive(Clone)]
pub struct CipherCodec {
    cryptor: Arc<dyn Cryptor>,
}

impl CipherCodec {
    pub fn new(cryptor: Arc<dyn Cryptor>) -> Self {
        Self { cryptor }
    }

    /// Encrypt `plaintext` for a column of the `declared` kind.
    ///
    /// Makes exactly one cryptor call for text and binary values and none for
    /// [`FieldValue::Absent`].
    ///
    /// # Errors
    ///
    /// - [`CodecError::UnsupportedFieldType`] if `declared` is not text or binary,
    ///   even for an absent value.
    /// - [`CodecError::EncryptionFailed`] if the cryptor fails, times out or is cancelled.
    pub async fn encode(
        &self,
        ctx: &CallContext,
        plaintext: FieldValue,
        declared: FieldKind,
    ) -> Result<StorageCell, CodecError> {
        if !declared.is_encryptable() {
            return Err(CodecError::UnsupportedFieldType(declared.to_string()));
        }

        match plaintext {
            FieldValue::Absent => Ok(StorageCell::Null),
            FieldValue::Binary(bytes) => {
                let sealed = self.encrypt(ctx, &bytes).await?;
                Ok(StorageCell::Binary(sealed.to_bytes()))
            }
            FieldValue::Text(text) => {
                let sealed = self.encrypt(ctx, text.as_bytes()).await?;
                Ok(StorageCell::Text(STANDARD.encode(sealed.to_bytes())))
            }
        }
    }

    /// Decrypt a storage cell into a plaintext of the `declared` kind.
    ///
    /// # Errors
    ///
    /// - [`CodecError::UnsupportedFieldType`] if `declared` is not text or binary.
    /// - [`CodecError::MalformedEncoding`] if a text cell is not valid base64.
    /// - [`CodecError::InvalidCiphertextFormat`] if the cell is shorter than an object id.
    /// - [`CodecError::DecryptionFailed`] if the cryptor fails, times out or is cancelled.
    /// - [`CodecError::NonUtf8Plaintext`] if a text field decrypts to invalid UTF-8.
    pub async fn decode(
        &self,
        ctx: &CallContext,
        cell: StorageCell,
        declared: FieldKind,
    ) -> Result<FieldValue, CodecError> {
        if !declared.is_encryptable() {
            return Err(CodecError::UnsupportedFieldType(declared.to_string()));
        }

        let raw = match cell {
            StorageCell::Null => return Ok(FieldValue::Absent),
            StorageCell::Binary(bytes) => bytes,
            StorageCell::Text(text) => STANDARD.decode(text)?,
        };
        let sealed = EncryptedValue::from_bytes(&raw)?;

        let plaintext = guarded(
            ctx,
            self.cryptor.decrypt(ctx, &sealed.object_id, &sealed.body),
        )
        .await
        .map_err(CodecError::DecryptionFailed)?;

        match declared {
            FieldKind::Binary => Ok(FieldValue::Binary(plaintext)),
            _ => String::from_utf8(plaintext)
                .map(FieldValue::Text)
                .map_err(|_| CodecError::NonUtf8Plaintext),
        }
    }

    async fn encrypt(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
    ) -> Result<EncryptedValue, CodecError> {
        guarded(ctx, self.cryptor.encrypt(ctx, plaintext))
            .await
            .map_err(CodecError::EncryptionFailed)
    }
}

/// Run a cryptor call under the context's deadline and cancellation token.
async fn guarded<T, F>(ctx: &CallContext, call: F) -> Result<T, CryptorError>
where
    F: Future<Output = Result<T, CryptorError>>,
{
    let bounded = async {
        match ctx.deadline() {
            Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
                Ok(result) => result,
                Err(_) => Err(CryptorError::DeadlineExceeded),
            },
            None => call.await,
        }
    };

    tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => Err(CryptorError::Cancelled),
        result = bounded => result,
    }
}
