//! [`Table`]: typed access to one table with per-column transforms applied.

use std::marker::PhantomData;
use std::sync::Arc;

use super::{ColumnDef, Filter, Key, Record, Row, RowStore, ScanQuery, StoreError, TableSchema};
use crate::cryptor::CallContext;

/// One page of records from [`Table::read_batch`].
#[derive(Debug)]
pub struct Batch<T> {
    pub records: Vec<T>,
    /// Primary key of the last row in the page; pass it back to read the next page.
    pub last_key: Option<Key>,
}

/// A table of `T` records backed by a [`RowStore`].
pub struct Table<T> {
    store: Arc<dyn RowStore>,
    schema: Arc<TableSchema>,
    primary_key: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            schema: self.schema.clone(),
            primary_key: self.primary_key.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Table<T> {
    /// Bind `schema` to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidSchema`] if the schema fails validation.
    pub fn new(store: Arc<dyn RowStore>, schema: TableSchema) -> Result<Self, StoreError> {
        schema.validate()?;
        let primary_key = schema.primary_key()?.name().to_owned();
        Ok(Self {
            store,
            schema: Arc::new(schema),
            primary_key,
            _record: PhantomData,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Insert new records in one atomic write.
    ///
    /// Every transformed column of every record is encoded before anything is
    /// written; the first failure aborts the insert with nothing persisted.
    pub async fn insert(&self, ctx: &CallContext, records: &[T]) -> Result<u64, StoreError> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(self.encode_row(ctx, record.to_row(), None).await?);
        }
        self.store
            .insert(self.schema.name(), &self.primary_key, rows)
            .await
    }

    /// All records matching `filter`, in primary-key order.
    pub async fn find(&self, ctx: &CallContext, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let rows = self.find_raw(filter).await?;
        self.decode_rows(ctx, rows).await
    }

    /// The first record matching `filter`, if any.
    pub async fn first(&self, ctx: &CallContext, filter: &Filter) -> Result<Option<T>, StoreError> {
        let query = ScanQuery::new(filter.clone()).limit(1);
        let rows = self
            .store
            .scan(self.schema.name(), &self.primary_key, &query)
            .await?;
        Ok(self.decode_rows(ctx, rows).await?.into_iter().next())
    }

    /// Stored rows matching `filter` exactly as persisted, with no transform applied.
    pub async fn find_raw(&self, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let query = ScanQuery::new(filter.clone());
        self.store
            .scan(self.schema.name(), &self.primary_key, &query)
            .await
    }

    /// Read up to `limit` records matching `filter` whose key is greater than `after`.
    ///
    /// With `columns`, only those columns (plus the primary key) are loaded;
    /// the rest of each record is built from nulls.
    pub async fn read_batch(
        &self,
        ctx: &CallContext,
        filter: &Filter,
        after: Option<&Key>,
        limit: usize,
        columns: Option<&[String]>,
    ) -> Result<Batch<T>, StoreError> {
        if let Some(columns) = columns {
            self.check_columns(columns)?;
        }
        let query = ScanQuery::new(filter.clone())
            .after(after.cloned())
            .limit(limit)
            .columns(columns.map(<[String]>::to_vec));
        let rows = self
            .store
            .scan(self.schema.name(), &self.primary_key, &query)
            .await?;

        let last_key = rows.last().and_then(|row| row.get(&self.primary_key).to_key());
        let records = self.decode_rows(ctx, rows).await?;
        Ok(Batch { records, last_key })
    }

    /// Persist `records` in one atomic write, returning the rows written.
    ///
    /// With `columns`, only those columns are written and every other stored
    /// cell is left untouched; without, each record replaces its stored row.
    pub async fn save_batch(
        &self,
        ctx: &CallContext,
        records: &[T],
        columns: Option<&[String]>,
    ) -> Result<u64, StoreError> {
        if let Some(columns) = columns {
            self.check_columns(columns)?;
        }
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(self.encode_row(ctx, record.to_row(), columns).await?);
        }
        self.store
            .save(self.schema.name(), &self.primary_key, rows, columns)
            .await
    }

    /// Delete every row matching `filter` in one atomic write.
    pub async fn delete(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.store.delete(self.schema.name(), filter).await
    }

    fn column(&self, name: &str) -> Result<&ColumnDef, StoreError> {
        self.schema
            .column_named(name)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.schema.name().to_owned(),
                column: name.to_owned(),
            })
    }

    fn check_columns(&self, columns: &[String]) -> Result<(), StoreError> {
        columns.iter().try_for_each(|c| self.column(c).map(|_| ()))
    }

    /// Type-check a row against the schema and run each column's write transform.
    async fn encode_row(
        &self,
        ctx: &CallContext,
        row: Row,
        columns: Option<&[String]>,
    ) -> Result<Row, StoreError> {
        let mut encoded = Row::new();
        for (name, value) in row {
            let column = self.column(&name)?;
            let wanted = column.is_primary_key()
                || columns.map_or(true, |cols| cols.iter().any(|c| *c == name));
            if !wanted {
                continue;
            }
            if let Some(kind) = value.kind() {
                if kind != column.kind() {
                    return Err(StoreError::TypeMismatch {
                        column: name,
                        expected: column.kind(),
                        found: value.type_name(),
                    });
                }
            }
            let value = match column.transform() {
                Some(transform) => transform.to_storage(ctx, column.kind(), value).await?,
                None => value,
            };
            encoded.set(name, value);
        }
        Ok(encoded)
    }

    /// Run each column's read transform and build records.
    async fn decode_rows(&self, ctx: &CallContext, rows: Vec<Row>) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut decoded = Row::new();
            for (name, stored) in row {
                let value = match self.schema.column_named(&name) {
                    Some(column) => match column.transform() {
                        Some(transform) => {
                            transform.from_storage(ctx, column.kind(), stored).await?
                        }
                        None => stored,
                    },
                    None => stored,
                };
                decoded.set(name, value);
            }
            records.push(T::from_row(&decoded)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldKind;
    use crate::cryptor::{MockCryptor, OBJECT_ID_LEN};
    use crate::error::{CodecError, CryptorError};
    use crate::serializer::FieldSerializer;
    use crate::store::{MemoryStore, Value};
    use crate::testutil::{document_schema, documents, stub_serializer, Document, StubCryptor};
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn document_table(serializer: &FieldSerializer) -> (Table<Document>, MemoryStore) {
        let store = MemoryStore::new();
        let table = Table::new(Arc::new(store.clone()), document_schema(serializer)).unwrap();
        (table, store)
    }

    #[tokio::test]
    async fn encrypted_columns_round_trip_and_are_opaque_at_rest() {
        let (serializer, stub) = stub_serializer();
        let (table, _) = document_table(&serializer);
        let ctx = CallContext::new();

        let mut doc = documents(1).remove(0);
        doc.encrypted_text = Some("Jackson".into());
        doc.encrypted_bytes = Some(b"Jackson".to_vec());
        table.insert(&ctx, std::slice::from_ref(&doc)).await.unwrap();
        assert_eq!(stub.encrypt_calls(), 2);

        let raw = table.find_raw(&Filter::All).await.unwrap();
        let Value::Text(cell) = raw[0].get("encrypted_text") else {
            panic!("expected text cell");
        };
        let decoded = STANDARD.decode(cell).unwrap();
        assert_eq!(&decoded[OBJECT_ID_LEN..], b"ENC(Jackson)");
        let Value::Blob(cell) = raw[0].get("encrypted_bytes") else {
            panic!("expected blob cell");
        };
        assert_eq!(&cell[OBJECT_ID_LEN..], b"ENC(Jackson)");

        let found = table.first(&ctx, &Filter::eq("id", doc.id)).await.unwrap();
        assert_eq!(found, Some(doc));
        assert_eq!(stub.decrypt_calls(), 2);
    }

    #[tokio::test]
    async fn null_encrypted_columns_skip_the_cryptor() {
        let serializer = FieldSerializer::new(Arc::new(MockCryptor::new()));
        let (table, _) = document_table(&serializer);
        let ctx = CallContext::new();

        let docs = documents(3);
        table.insert(&ctx, &docs).await.unwrap();
        let found = table.find(&ctx, &Filter::All).await.unwrap();
        assert_eq!(found, docs);
    }

    #[tokio::test]
    async fn encryption_failure_persists_nothing() {
        let stub = Arc::new(StubCryptor::new().failing_encrypt_after(1));
        let serializer = FieldSerializer::new(stub);
        let (table, store) = document_table(&serializer);
        let ctx = CallContext::new();

        let mut docs = documents(2);
        for doc in &mut docs {
            doc.encrypted_text = Some(doc.text.clone());
        }
        let err = table.insert(&ctx, &docs).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Codec(CodecError::EncryptionFailed(CryptorError::Backend(_)))
        ));
        assert_eq!(store.row_count("documents").await, 0);
    }

    #[tokio::test]
    async fn decryption_failure_aborts_the_read() {
        let (serializer, _) = stub_serializer();
        let (table, store) = document_table(&serializer);
        let ctx = CallContext::new();

        let corrupt = Row::new()
            .with("id", 1i64)
            .with("encrypted_text", Value::Text("@@not base64@@".into()));
        store.insert("documents", "id", vec![corrupt]).await.unwrap();

        let err = table.find(&ctx, &Filter::All).await.unwrap_err();
        assert!(matches!(err, StoreError::Codec(CodecError::MalformedEncoding(_))));
    }

    #[tokio::test]
    async fn unsupported_encrypted_column_fails_write_and_read() {
        #[derive(Debug, Clone, PartialEq)]
        struct PersonAge {
            first_name: String,
            age: i64,
        }
        impl Record for PersonAge {
            fn to_row(&self) -> Row {
                Row::new()
                    .with("first_name", self.first_name.as_str())
                    .with("age", self.age)
            }
            fn from_row(row: &Row) -> Result<Self, StoreError> {
                Ok(Self {
                    first_name: row.text("first_name")?.unwrap_or_default(),
                    age: row.integer("age")?.unwrap_or_default(),
                })
            }
        }

        let store = MemoryStore::new();
        let plain = TableSchema::new("people")
            .column(ColumnDef::new("first_name", FieldKind::Text).primary_key())
            .column(ColumnDef::new("age", FieldKind::Integer));
        let plain: Table<PersonAge> = Table::new(Arc::new(store.clone()), plain).unwrap();
        let ctx = CallContext::new();
        let john = PersonAge {
            first_name: "John".into(),
            age: 30,
        };
        plain.insert(&ctx, &[john]).await.unwrap();

        let serializer = FieldSerializer::new(Arc::new(MockCryptor::new()));
        let tagged = TableSchema::new("people")
            .column(ColumnDef::new("first_name", FieldKind::Text).primary_key())
            .column(ColumnDef::new("age", FieldKind::Integer).with_transform(serializer));
        let tagged: Table<PersonAge> = Table::new(Arc::new(store.clone()), tagged).unwrap();

        let henry = PersonAge {
            first_name: "Henry".into(),
            age: 30,
        };
        let err = tagged.insert(&ctx, &[henry]).await.unwrap_err();
        assert!(matches!(err, StoreError::Codec(CodecError::UnsupportedFieldType(_))));

        let err = tagged.find(&ctx, &Filter::eq("first_name", "John")).await.unwrap_err();
        assert!(matches!(err, StoreError::Codec(CodecError::UnsupportedFieldType(_))));
        assert_eq!(store.row_count("people").await, 1);
    }

    #[tokio::test]
    async fn null_into_unsupported_encrypted_column_is_rejected() {
        #[derive(Debug)]
        struct MaybeAge {
            first_name: String,
            age: Option<i64>,
        }
        impl Record for MaybeAge {
            fn to_row(&self) -> Row {
                Row::new()
                    .with("first_name", self.first_name.as_str())
                    .with("age", self.age.map_or(Value::Null, Value::Integer))
            }
            fn from_row(row: &Row) -> Result<Self, StoreError> {
                Ok(Self {
                    first_name: row.text("first_name")?.unwrap_or_default(),
                    age: row.integer("age")?,
                })
            }
        }

        // No expectations: any cryptor call panics.
        let serializer = FieldSerializer::new(Arc::new(MockCryptor::new()));
        let schema = TableSchema::new("people")
            .column(ColumnDef::new("first_name", FieldKind::Text).primary_key())
            .column(ColumnDef::new("age", FieldKind::Integer).with_transform(serializer));
        let store = MemoryStore::new();
        let table: Table<MaybeAge> = Table::new(Arc::new(store.clone()), schema).unwrap();

        let unknown_age = MaybeAge {
            first_name: "Henry".into(),
            age: None,
        };
        let err = table.insert(&CallContext::new(), &[unknown_age]).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Codec(CodecError::UnsupportedFieldType(ref t)) if t == "integer"
        ));
        assert_eq!(store.row_count("people").await, 0);
    }

    #[tokio::test]
    async fn delete_removes_matching_records() {
        let (serializer, stub) = stub_serializer();
        let (table, store) = document_table(&serializer);
        let ctx = CallContext::new();
        table.insert(&ctx, &documents(4)).await.unwrap();

        let removed = table
            .delete(&Filter::eq("id", 2i64).or(Filter::eq("id", 3i64)))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(stub.decrypt_calls(), 0);

        let ids: Vec<i64> = table
            .find(&ctx, &Filter::All)
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(store.commits().await, vec![4, 2]);
    }

    #[tokio::test]
    async fn type_mismatch_and_unknown_columns_rejected() {
        #[derive(Debug)]
        struct Loose(Row);
        impl Record for Loose {
            fn to_row(&self) -> Row {
                self.0.clone()
            }
            fn from_row(row: &Row) -> Result<Self, StoreError> {
                Ok(Self(row.clone()))
            }
        }

        let (serializer, _) = stub_serializer();
        let store = MemoryStore::new();
        let table: Table<Loose> =
            Table::new(Arc::new(store), document_schema(&serializer)).unwrap();
        let ctx = CallContext::new();

        let wrong_type = Loose(Row::new().with("id", 1i64).with("text", 5i64));
        assert!(matches!(
            table.insert(&ctx, &[wrong_type]).await.unwrap_err(),
            StoreError::TypeMismatch { .. }
        ));

        let unknown = Loose(Row::new().with("id", 1i64).with("nickname", "x"));
        assert!(matches!(
            table.insert(&ctx, &[unknown]).await.unwrap_err(),
            StoreError::UnknownColumn { .. }
        ));

        let projection = vec!["nickname".to_string()];
        assert!(matches!(
            table.save_batch(&ctx, &[], Some(projection.as_slice())).await.unwrap_err(),
            StoreError::UnknownColumn { .. }
        ));
    }

    #[tokio::test]
    async fn read_batch_pages_by_key() {
        let (serializer, _) = stub_serializer();
        let (table, _) = document_table(&serializer);
        let ctx = CallContext::new();
        table.insert(&ctx, &documents(5)).await.unwrap();

        let first = table.read_batch(&ctx, &Filter::All, None, 3, None).await.unwrap();
        assert_eq!(first.records.len(), 3);
        assert_eq!(first.last_key, Some(Key::Integer(3)));

        let second = table
            .read_batch(&ctx, &Filter::All, first.last_key.as_ref(), 3, None)
            .await
            .unwrap();
        let ids: Vec<i64> = second.records.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn projected_save_writes_only_named_columns() {
        let (serializer, stub) = stub_serializer();
        let (table, _) = document_table(&serializer);
        let ctx = CallContext::new();
        table.insert(&ctx, &documents(1)).await.unwrap();

        let mut doc = table.first(&ctx, &Filter::All).await.unwrap().unwrap();
        let original_text = doc.text.clone();
        doc.text = "clobbered".into();
        doc.encrypted_text = Some(original_text.clone());
        doc.encrypted_bytes = Some(b"ignored".to_vec());

        let columns = vec!["encrypted_text".to_string()];
        table.save_batch(&ctx, &[doc], Some(columns.as_slice())).await.unwrap();
        // Only the projected encrypted column was encoded.
        assert_eq!(stub.encrypt_calls(), 1);

        let stored = table.first(&ctx, &Filter::All).await.unwrap().unwrap();
        assert_eq!(stored.text, original_text);
        assert_eq!(stored.encrypted_text, Some(original_text));
        assert_eq!(stored.encrypted_bytes, None);
    }
}
