//! Deterministic cryptor and table fixtures shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::codec::FieldKind;
use crate::cryptor::{CallContext, Cryptor, EncryptedValue, ObjectId};
use crate::error::CryptorError;
use crate::serializer::FieldSerializer;
use crate::store::{ColumnDef, Record, Row, StoreError, TableSchema, Value};

/// Object id returned by [`StubCryptor`] for every call.
pub const NIL_OBJECT_ID: ObjectId = nil_object_id();

const fn nil_object_id() -> ObjectId {
    // "00000000-0000-0000-0000-000000000000"
    let mut buf = [b'0'; 36];
    buf[8] = b'-';
    buf[13] = b'-';
    buf[18] = b'-';
    buf[23] = b'-';
    ObjectId::from_array(buf)
}

/// Cryptor whose ciphertext is `ENC(<plaintext>)` under the nil object id.
#[derive(Debug, Default)]
pub struct StubCryptor {
    encrypts: AtomicUsize,
    decrypts: AtomicUsize,
    fail_encrypt_after: Option<usize>,
    delay: Option<Duration>,
}

impl StubCryptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the first `n` encrypt calls succeed and fail every later one.
    pub fn failing_encrypt_after(mut self, n: usize) -> Self {
        self.fail_encrypt_after = Some(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Cryptor for StubCryptor {
    async fn encrypt(
        &self,
        _ctx: &CallContext,
        plaintext: &[u8],
    ) -> Result<EncryptedValue, CryptorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.encrypts.fetch_add(1, Ordering::SeqCst);
        if matches!(self.fail_encrypt_after, Some(n) if call >= n) {
            return Err(CryptorError::Backend("backend outage".into()));
        }
        let mut body = b"ENC(".to_vec();
        body.extend_from_slice(plaintext);
        body.push(b')');
        Ok(EncryptedValue::new(NIL_OBJECT_ID, body))
    }

    async fn decrypt(
        &self,
        _ctx: &CallContext,
        object_id: &ObjectId,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        if *object_id != NIL_OBJECT_ID {
            return Err(CryptorError::Backend(format!("unknown object {object_id}")));
        }
        ciphertext
            .strip_prefix(b"ENC(")
            .and_then(|rest| rest.strip_suffix(b")"))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| CryptorError::Backend("not an ENC(..) body".into()))
    }
}

/// A document whose plaintext columns are being backfilled into encrypted ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub id: i64,
    pub text: String,
    pub bytes: Vec<u8>,
    pub encrypted_text: Option<String>,
    pub encrypted_bytes: Option<Vec<u8>>,
}

impl Record for Document {
    fn to_row(&self) -> Row {
        Row::new()
            .with("id", Value::Integer(self.id))
            .with("text", Value::Text(self.text.clone()))
            .with("bytes", Value::Blob(self.bytes.clone()))
            .with("encrypted_text", Value::from(self.encrypted_text.clone()))
            .with("encrypted_bytes", Value::from(self.encrypted_bytes.clone()))
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.integer("id")?.unwrap_or_default(),
            text: row.text("text")?.unwrap_or_default(),
            bytes: row.blob("bytes")?.unwrap_or_default(),
            encrypted_text: row.text("encrypted_text")?,
            encrypted_bytes: row.blob("encrypted_bytes")?,
        })
    }
}

/// Schema for [`Document`] with the two encrypted columns wired to `serializer`.
pub fn document_schema(serializer: &FieldSerializer) -> TableSchema {
    TableSchema::new("documents")
        .column(ColumnDef::new("id", FieldKind::Integer).primary_key())
        .column(ColumnDef::new("text", FieldKind::Text))
        .column(ColumnDef::new("bytes", FieldKind::Binary))
        .column(ColumnDef::new("encrypted_text", FieldKind::Text).with_transform(serializer.clone()))
        .column(
            ColumnDef::new("encrypted_bytes", FieldKind::Binary).with_transform(serializer.clone()),
        )
}

/// `count` documents with distinct plaintext and nothing encrypted yet.
pub fn documents(count: usize) -> Vec<Document> {
    (1..=count as i64)
        .map(|id| Document {
            id,
            text: format!("Secret #{id}"),
            bytes: Uuid::new_v4().as_bytes().to_vec(),
            encrypted_text: None,
            encrypted_bytes: None,
        })
        .collect()
}

pub fn stub_serializer() -> (FieldSerializer, Arc<StubCryptor>) {
    let stub = Arc::new(StubCryptor::new());
    (FieldSerializer::new(stub.clone()), stub)
}
