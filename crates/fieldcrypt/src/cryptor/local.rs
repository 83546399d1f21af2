//! In-process [`Cryptor`] backed by AES-256-GCM-SIV.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant,
//! so an accidental nonce repeat leaks equality of plaintexts but not the key.
//! Each call still draws a fresh 96-bit nonce from the OS CSPRNG.
//!
//! # Body format
//!
//! ```text
//! nonce (12 bytes) ‖ ciphertext + tag
//! ```
//!
//! The object identifier is bound as associated data: decrypting a body under
//! any other identifier fails authentication.

use std::fmt;

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use async_trait::async_trait;
use uuid::Uuid;

use super::{CallContext, Cryptor, EncryptedValue, ObjectId};
use crate::error::CryptorError;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Key buffer zeroed on drop.
struct KeyBytes(Box<[u8; KEY_LEN]>);

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// A [`Cryptor`] that encrypts locally with a caller-supplied key.
pub struct LocalCryptor {
    key: KeyBytes,
    required_token: Option<String>,
}

impl LocalCryptor {
    /// Build a cryptor from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptorError::InvalidKey`] if `key` is not [`KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptorError> {
        if key.len() != KEY_LEN {
            return Err(CryptorError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(key);
        Ok(Self {
            key: KeyBytes(buf),
            required_token: None,
        })
    }

    /// Build a cryptor with a random key drawn from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut buf = Box::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut buf[..]);
        Self {
            key: KeyBytes(buf),
            required_token: None,
        }
    }

    /// Reject every call whose [`CallContext`] does not carry `token`.
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    fn authorize(&self, ctx: &CallContext) -> Result<(), CryptorError> {
        match (&self.required_token, ctx.token()) {
            (None, _) => Ok(()),
            (Some(expected), Some(given)) if expected == given => Ok(()),
            (Some(_), Some(_)) => Err(CryptorError::Unauthenticated("token rejected".into())),
            (Some(_), None) => Err(CryptorError::Unauthenticated("token missing".into())),
        }
    }

    fn cipher(&self) -> Result<Aes256GcmSiv, CryptorError> {
        Aes256GcmSiv::new_from_slice(&self.key.0[..])
            .map_err(|_| CryptorError::InvalidKey(format!("expected {KEY_LEN} bytes")))
    }
}

impl fmt::Debug for LocalCryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("LocalCryptor")
            .field("key", &"[REDACTED]")
            .field("requires_token", &self.required_token.is_some())
            .finish()
    }
}

#[async_trait]
impl Cryptor for LocalCryptor {
    async fn encrypt(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
    ) -> Result<EncryptedValue, CryptorError> {
        self.authorize(ctx)?;
        let object_id = ObjectId::from_uuid(Uuid::new_v4());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher()?
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: object_id.as_bytes(),
                },
            )
            .map_err(|_| CryptorError::Backend("aead encryption failed".into()))?;

        let mut body = Vec::with_capacity(NONCE_LEN + sealed.len());
        body.extend_from_slice(&nonce_bytes);
        body.extend_from_slice(&sealed);
        Ok(EncryptedValue::new(object_id, body))
    }

    async fn decrypt(
        &self,
        ctx: &CallContext,
        object_id: &ObjectId,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptorError> {
        self.authorize(ctx)?;
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptorError::Backend(format!(
                "ciphertext body shorter than {NONCE_LEN}-byte nonce"
            )));
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        self.cipher()?
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: sealed,
                    aad: object_id.as_bytes(),
                },
            )
            .map_err(|_| CryptorError::Backend("aead authentication failed".into()))
    }
}
