//! [`MemoryStore`]: an in-process [`RowStore`].
//!
//! Tables are created on first insert. Each write call takes the write lock
//! once, validates every row, and only then applies them, which gives the
//! same all-or-nothing behaviour as a single transaction.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Filter, Key, Row, RowStore, ScanQuery, StoreError};

type TableRows = BTreeMap<Key, Row>;

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, TableRows>,
    /// Rows applied by each successful write call, in commit order.
    commits: Vec<usize>,
    /// Number of write calls allowed to succeed before every later one fails.
    fail_writes_after: Option<usize>,
    write_calls: usize,
}

impl State {
    fn check_injected_failure(&mut self) -> Result<(), StoreError> {
        let call = self.write_calls;
        self.write_calls += 1;
        match self.fail_writes_after {
            Some(n) if call >= n => Err(StoreError::Backend("injected write failure".into())),
            _ => Ok(()),
        }
    }
}

/// Thread-safe in-memory row store.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `n` write calls succeed and fail every one after that
    /// with [`StoreError::Backend`].
    pub async fn fail_writes_after(&self, n: usize) {
        let mut state = self.inner.write().await;
        state.fail_writes_after = Some(state.write_calls + n);
    }

    /// Stop injecting write failures.
    pub async fn heal(&self) {
        self.inner.write().await.fail_writes_after = None;
    }

    /// Number of rows applied by each successful write call, oldest first.
    pub async fn commits(&self) -> Vec<usize> {
        self.inner.read().await.commits.clone()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.inner
            .read()
            .await
            .tables
            .get(table)
            .map_or(0, BTreeMap::len)
    }
}

fn key_of(table: &str, primary_key: &str, row: &Row) -> Result<Key, StoreError> {
    row.get(primary_key)
        .to_key()
        .ok_or_else(|| StoreError::MissingPrimaryKey(table.to_owned()))
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn insert(
        &self,
        table: &str,
        primary_key: &str,
        rows: Vec<Row>,
    ) -> Result<u64, StoreError> {
        let mut state = self.inner.write().await;
        state.check_injected_failure()?;

        let existing = state.tables.get(table);
        let mut staged: TableRows = BTreeMap::new();
        for row in rows {
            let key = key_of(table, primary_key, &row)?;
            let taken = existing.is_some_and(|t| t.contains_key(&key));
            if taken || staged.contains_key(&key) {
                return Err(StoreError::DuplicateKey {
                    table: table.to_owned(),
                    key: key.to_string(),
                });
            }
            staged.insert(key, row);
        }

        let count = staged.len();
        state.tables.entry(table.to_owned()).or_default().extend(staged);
        state.commits.push(count);
        Ok(count as u64)
    }

    async fn scan(
        &self,
        table: &str,
        primary_key: &str,
        query: &ScanQuery,
    ) -> Result<Vec<Row>, StoreError> {
        let state = self.inner.read().await;
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_owned()))?;

        let lower = match &query.after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(rows
            .range((lower, Bound::Unbounded))
            .map(|(_, row)| row)
            .filter(|row| query.filter.matches(row))
            .take(limit)
            .map(|row| {
                let mut row = row.clone();
                if let Some(columns) = &query.columns {
                    let mut keep: Vec<&str> = columns.iter().map(String::as_str).collect();
                    keep.push(primary_key);
                    row.retain_columns(&keep[..]);
                }
                row
            })
            .collect())
    }

    async fn save(
        &self,
        table: &str,
        primary_key: &str,
        rows: Vec<Row>,
        columns: Option<&[String]>,
    ) -> Result<u64, StoreError> {
        let mut state = self.inner.write().await;
        state.check_injected_failure()?;

        if !state.tables.contains_key(table) {
            return Err(StoreError::UnknownTable(table.to_owned()));
        }

        let mut staged = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = key_of(table, primary_key, &row)?;
            if let Some(columns) = columns {
                let mut keep: Vec<&str> = columns.iter().map(String::as_str).collect();
                keep.push(primary_key);
                row.retain_columns(&keep[..]);
            }
            staged.push((key, row));
        }

        let count = staged.len();
        let stored = state.tables.entry(table.to_owned()).or_default();
        for (key, row) in staged {
            match (columns, stored.get_mut(&key)) {
                (Some(_), Some(existing)) => existing.merge(row),
                _ => {
                    stored.insert(key, row);
                }
            }
        }
        state.commits.push(count);
        Ok(count as u64)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut state = self.inner.write().await;
        state.check_injected_failure()?;

        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_owned()))?;
        let before = rows.len();
        rows.retain(|_, row| !filter.matches(row));
        let count = before - rows.len();
        state.commits.push(count);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Filter, Value};

    fn person(id: i64, name: &str) -> Row {
        Row::new().with("id", id).with("name", name).with("age", 30i64)
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let rows = (1..=5).map(|i| person(i, &format!("p{i}"))).collect();
        store.insert("people", "id", rows).await.unwrap();
        store
    }

    #[tokio::test]
    async fn scan_pages_in_key_order() {
        let store = seeded().await;
        let first = store
            .scan("people", "id", &ScanQuery::new(Filter::All).limit(2))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].integer("id").unwrap(), Some(2));

        let next = store
            .scan(
                "people",
                "id",
                &ScanQuery::new(Filter::All).after(Some(Key::Integer(2))).limit(10),
            )
            .await
            .unwrap();
        let ids: Vec<_> = next.iter().map(|r| r.integer("id").unwrap().unwrap()).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn scan_applies_filter_and_projection() {
        let store = seeded().await;
        let query = ScanQuery::new(Filter::eq("name", "p3")).columns(Some(vec!["name".into()]));
        let rows = store.scan("people", "id", &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("id"));
        assert!(rows[0].contains("name"));
        assert!(!rows[0].contains("age"));
    }

    #[tokio::test]
    async fn insert_is_all_or_nothing() {
        let store = seeded().await;
        let err = store
            .insert("people", "id", vec![person(6, "new"), person(3, "dup")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.row_count("people").await, 5);

        let err = store
            .insert("people", "id", vec![Row::new().with("name", "no key")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingPrimaryKey(_)));
    }

    #[tokio::test]
    async fn projected_save_keeps_other_columns() {
        let store = seeded().await;
        let update = Row::new().with("id", 1i64).with("name", "renamed").with("age", 99i64);
        store
            .save("people", "id", vec![update], Some(&["name".to_string()][..]))
            .await
            .unwrap();

        let rows = store
            .scan("people", "id", &ScanQuery::new(Filter::eq("id", 1i64)))
            .await
            .unwrap();
        assert_eq!(rows[0].get("name"), &Value::Text("renamed".into()));
        assert_eq!(rows[0].get("age"), &Value::Integer(30));
    }

    #[tokio::test]
    async fn full_save_replaces_rows() {
        let store = seeded().await;
        let update = Row::new().with("id", 1i64).with("name", "only name");
        store.save("people", "id", vec![update], None).await.unwrap();
        let rows = store
            .scan("people", "id", &ScanQuery::new(Filter::eq("id", 1i64)))
            .await
            .unwrap();
        assert!(!rows[0].contains("age"));
    }

    #[tokio::test]
    async fn delete_removes_matching_rows_only() {
        let store = seeded().await;
        let removed = store
            .delete("people", &Filter::eq("name", "p2").or(Filter::eq("name", "p4")))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.row_count("people").await, 3);
        assert_eq!(store.commits().await, vec![5, 2]);

        let ids: Vec<_> = store
            .scan("people", "id", &ScanQuery::default())
            .await
            .unwrap()
            .iter()
            .map(|r| r.integer("id").unwrap().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 3, 5]);

        assert_eq!(store.delete("people", &Filter::eq("name", "none")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_delete_removes_nothing() {
        let store = seeded().await;
        store.fail_writes_after(0).await;
        let err = store.delete("people", &Filter::All).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.row_count("people").await, 5);
        assert!(matches!(
            MemoryStore::new().delete("nope", &Filter::All).await,
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[tokio::test]
    async fn unknown_table_errors() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.scan("nope", "id", &ScanQuery::default()).await,
            Err(StoreError::UnknownTable(_))
        ));
        assert!(matches!(
            store.save("nope", "id", vec![], None).await,
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[tokio::test]
    async fn commit_log_and_failure_injection() {
        let store = seeded().await;
        store.fail_writes_after(1).await;
        store
            .save("people", "id", vec![person(1, "a"), person(2, "b")], None)
            .await
            .unwrap();
        let err = store
            .save("people", "id", vec![person(3, "c")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.commits().await, vec![5, 2]);

        store.heal().await;
        store.save("people", "id", vec![person(3, "c")], None).await.unwrap();
        assert_eq!(store.commits().await, vec![5, 2, 1]);
    }
}
