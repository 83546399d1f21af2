//! The `users` table: a plaintext model extended with two encrypted name columns.

use std::sync::Arc;

use fieldcrypt::store::{ColumnDef, Filter, Record, Row, RowStore, StoreError, TableSchema};
use fieldcrypt::{CallContext, FieldKind, FieldSerializer, Table};

pub const TABLE: &str = "users";

const FIRST_NAMES: [&str; 10] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Miller", "Davis", "Garcia", "Rodriguez",
    "Wilson",
];
const LAST_NAMES: [&str; 10] = [
    "James", "Robert", "John", "Michael", "David", "William", "Richard", "Joseph", "Thomas",
    "Charles",
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub first_name_encrypted: Option<String>,
    pub last_name_encrypted: Option<String>,
    pub videos_watched: i64,
    pub favorites: i64,
}

impl Record for User {
    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("first_name", self.first_name.as_str())
            .with("last_name", self.last_name.as_str())
            .with("first_name_encrypted", self.first_name_encrypted.clone())
            .with("last_name_encrypted", self.last_name_encrypted.clone())
            .with("videos_watched", self.videos_watched)
            .with("favorites", self.favorites)
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.integer("id")?.unwrap_or_default(),
            first_name: row.text("first_name")?.unwrap_or_default(),
            last_name: row.text("last_name")?.unwrap_or_default(),
            first_name_encrypted: row.text("first_name_encrypted")?,
            last_name_encrypted: row.text("last_name_encrypted")?,
            videos_watched: row.integer("videos_watched")?.unwrap_or_default(),
            favorites: row.integer("favorites")?.unwrap_or_default(),
        })
    }
}

/// Schema with the encrypted columns routed through `serializer`.
pub fn schema(serializer: &FieldSerializer) -> TableSchema {
    TableSchema::new(TABLE)
        .column(ColumnDef::new("id", FieldKind::Integer).primary_key())
        .column(ColumnDef::new("first_name", FieldKind::Text))
        .column(ColumnDef::new("last_name", FieldKind::Text))
        .column(
            ColumnDef::new("first_name_encrypted", FieldKind::Text)
                .with_transform(serializer.clone()),
        )
        .column(
            ColumnDef::new("last_name_encrypted", FieldKind::Text)
                .with_transform(serializer.clone()),
        )
        .column(ColumnDef::new("videos_watched", FieldKind::Integer))
        .column(ColumnDef::new("favorites", FieldKind::Integer))
}

pub fn table(
    store: Arc<dyn RowStore>,
    serializer: &FieldSerializer,
) -> Result<Table<User>, StoreError> {
    Table::new(store, schema(serializer))
}

/// Rows whose names have not been copied into the encrypted columns yet.
pub fn unencrypted() -> Filter {
    Filter::is_null("first_name_encrypted").and(Filter::is_null("last_name_encrypted"))
}

/// Copy the plaintext names into the encrypted columns.
pub fn encrypt_names(user: &mut User) {
    user.first_name_encrypted = Some(user.first_name.clone());
    user.last_name_encrypted = Some(user.last_name.clone());
}

/// Insert `count` users with plaintext names only, ids following `first_id`.
///
/// Names and counters are spread deterministically from the id.
pub async fn seed(
    table: &Table<User>,
    ctx: &CallContext,
    first_id: i64,
    count: usize,
) -> Result<u64, StoreError> {
    let users: Vec<User> = (first_id..)
        .take(count)
        .map(|id| {
            let n = id.unsigned_abs() as usize;
            let watched = (id * 37).rem_euclid(1000);
            User {
                id,
                first_name: FIRST_NAMES[n % FIRST_NAMES.len()].to_owned(),
                last_name: LAST_NAMES[(n * 7) % LAST_NAMES.len()].to_owned(),
                videos_watched: watched,
                favorites: watched / 3,
                ..User::default()
            }
        })
        .collect();
    table.insert(ctx, &users).await
}
