//! Error types for the cryptor boundary and the field codec.
//!
//! The variants of [`CodecError`] are what a caller sees when a single field
//! read or write fails:
//! - [`CodecError::UnsupportedFieldType`] → configuration error, never retried
//! - [`CodecError::InvalidCiphertextFormat`] / [`CodecError::MalformedEncoding`] → corrupt cell
//! - [`CodecError::EncryptionFailed`] / [`CodecError::DecryptionFailed`] → backend fault,
//!   propagated verbatim

use thiserror::Error;

use crate::cryptor::OBJECT_ID_LEN;

/// Failure reported by a [`Cryptor`](crate::cryptor::Cryptor) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptorError {
    /// The backend rejected or failed the call (network, remote fault, auth tag mismatch).
    #[error("crypto backend error: {0}")]
    Backend(String),

    /// The per-call credentials were missing or not accepted.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller's deadline elapsed while the call was outstanding.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the call while it was outstanding.
    #[error("call cancelled")]
    Cancelled,

    /// The cryptor was constructed with unusable key material.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Errors produced while encoding or decoding an encrypted field.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The field's type cannot be encrypted. Only text and binary fields are supported.
    #[error("unsupported field type {0}: supported encryption field types are text and binary")]
    UnsupportedFieldType(String),

    /// The stored cell is too short to carry an object identifier.
    #[error("invalid ciphertext format: expected at least {OBJECT_ID_LEN} bytes, got {len}")]
    InvalidCiphertextFormat {
        /// Length of the rejected cell in bytes.
        len: usize,
    },

    /// A text cell is not valid standard base64.
    #[error("malformed base64 in text cell: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),

    /// The cryptor failed to encrypt the field.
    #[error("encryption failed: {0}")]
    EncryptionFailed(#[source] CryptorError),

    /// The cryptor failed to decrypt the field.
    #[error("decryption failed: {0}")]
    DecryptionFailed(#[source] CryptorError),

    /// The decrypted bytes of a text field are not valid UTF-8.
    #[error("decrypted plaintext of a text field is not valid UTF-8")]
    NonUtf8Plaintext,
}
