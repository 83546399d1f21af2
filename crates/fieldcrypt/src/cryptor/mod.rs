//! The cryptographic backend boundary.
//!
//! A [`Cryptor`] encrypts plaintext into an [`EncryptedValue`] keyed by an
//! [`ObjectId`], and decrypts given the same identifier back. The field codec
//! depends on this trait and never implements it; production deployments plug
//! in a remote crypto-service client, while [`LocalCryptor`] runs the same
//! contract in-process.
//!
//! # Wire layout
//!
//! ```text
//! object_id (36 bytes) ‖ ciphertext body (variable)
//! ```

pub mod local;

pub use local::LocalCryptor;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CodecError, CryptorError};

/// Byte length of an object identifier (a hyphenated UUID string).
pub const OBJECT_ID_LEN: usize = 36;

/// Fixed-width handle identifying the encryption context of one ciphertext.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// The hyphenated string form of `uuid`.
    pub fn from_uuid(uuid: Uuid) -> Self {
        let mut buf = [0u8; OBJECT_ID_LEN];
        uuid.hyphenated().encode_lower(&mut buf);
        Self(buf)
    }

    pub const fn from_array(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy an identifier out of a slice of exactly [`OBJECT_ID_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let buf: [u8; OBJECT_ID_LEN] = bytes.try_into().ok()?;
        Some(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// The logical encrypted form of one plaintext value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    pub object_id: ObjectId,
    /// Opaque bytes produced by the backend.
    pub body: Vec<u8>,
}

impl EncryptedValue {
    pub fn new(object_id: ObjectId, body: Vec<u8>) -> Self {
        Self { object_id, body }
    }

    /// Serialise to `object_id ‖ body`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(OBJECT_ID_LEN + self.body.len());
        out.extend_from_slice(self.object_id.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Split a serialised value into identifier and body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidCiphertextFormat`] if `bytes` is shorter
    /// than [`OBJECT_ID_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < OBJECT_ID_LEN {
            return Err(CodecError::InvalidCiphertextFormat { len: bytes.len() });
        }
        let (id, body) = bytes.split_at(OBJECT_ID_LEN);
        let object_id = ObjectId::from_slice(id)
            .ok_or(CodecError::InvalidCiphertextFormat { len: bytes.len() })?;
        Ok(Self::new(object_id, body.to_vec()))
    }
}

/// Caller-supplied scope for a single cryptor call.
///
/// Carries request credentials, an optional deadline and a cancellation
/// token. The codec enforces the deadline and cancellation around every
/// backend call; the credentials are only read by the [`Cryptor`].
#[derive(Clone, Default)]
pub struct CallContext {
    token: Option<String>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a bearer token forwarded to the backend on every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Give every call made under this context until `now + timeout` to finish.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Tie this context to an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print credentials.
        f.debug_struct("CallContext")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Two-operation contract implemented by a crypto backend.
///
/// For any `(object_id, body)` pair returned by [`Cryptor::encrypt`], a later
/// [`Cryptor::decrypt`] with the same pair must return the original
/// plaintext. Decrypting under a foreign identifier is undefined.
/// Implementations own any retry policy; callers never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cryptor: Send + Sync {
    /// Encrypt `plaintext` under a fresh object identifier.
    async fn encrypt(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
    ) -> Result<EncryptedValue, CryptorError>;

    /// Decrypt `ciphertext` that was produced under `object_id`.
    async fn decrypt(
        &self,
        ctx: &CallContext,
        object_id: &ObjectId,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptorError>;
}
