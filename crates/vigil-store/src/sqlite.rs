// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite backend.
//!
//! One table per collection, `(id TEXT PRIMARY KEY, doc TEXT)`, documents
//! stored as JSON text. Updates are read-modify-write inside a transaction
//! using the same operator applier and filter matcher as every other
//! backend. The pool holds a single connection, so transactions serialize
//! and `find_one_and_update` is atomic; cross-process races surface as
//! UNIQUE violations and are classified as duplicate-key errors.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::StoreError;
use crate::filter::matches;
use crate::ops::{BulkSummary, OpError, OpErrorClass, UpdateDoc, WriteOp};
use crate::store::DocStore;
use crate::update::{apply_update, upsert_document};

/// The embedded SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
    minted: AtomicU64,
}

impl SqliteStore {
    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            minted: AtomicU64::new(0),
        }
    }

    /// Create and initialize a store from a database file path.
    ///
    /// Creates parent directories and the database file as needed.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::backend("create_dir", format!("{:?}: {}", parent, e))
                })?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|e| StoreError::backend("connect", format!("{:?}: {}", path, e)))?;

        Ok(Self::new(pool))
    }

    fn table(col: &str) -> Result<String, StoreError> {
        if col.is_empty()
            || !col
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::InvalidCollection(col.to_string()));
        }
        Ok(format!("col_{col}"))
    }

    async fn ensure(&self, table: &str) -> Result<(), StoreError> {
        let sql =
            format!("CREATE TABLE IF NOT EXISTS \"{table}\" (id TEXT PRIMARY KEY, doc TEXT NOT NULL)");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    fn key_of(&self, doc: &mut Value) -> String {
        if let Some(id) = doc.get("_id") {
            return serde_json::to_string(id).expect("id serialization cannot fail");
        }
        let n = self.minted.fetch_add(1, Ordering::Relaxed);
        let id = format!("sq:{:x}:{n:08x}", std::process::id());
        if let Some(map) = doc.as_object_mut() {
            map.insert("_id".to_string(), Value::from(id.clone()));
        }
        format!("\"{id}\"")
    }

    async fn load_matching(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        table: &str,
        filter: &Value,
        first_only: bool,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let sql = format!("SELECT id, doc FROM \"{table}\" ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&mut **tx).await?;
        let mut out = Vec::new();
        for row in rows {
            let key: String = row.get(0);
            let text: String = row.get(1);
            let doc: Value = serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
                collection: table.to_string(),
                details: e.to_string(),
            })?;
            if matches(&doc, filter) {
                out.push((key, doc));
                if first_only {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn write_doc(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        table: &str,
        key: &str,
        doc: &Value,
    ) -> Result<(), sqlx::Error> {
        let sql = format!("UPDATE \"{table}\" SET doc = ?2 WHERE id = ?1");
        sqlx::query(&sql)
            .bind(key)
            .bind(doc.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn insert_doc(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        table: &str,
        key: &str,
        doc: &Value,
    ) -> Result<(), sqlx::Error> {
        let sql = format!("INSERT INTO \"{table}\" (id, doc) VALUES (?1, ?2)");
        sqlx::query(&sql)
            .bind(key)
            .bind(doc.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    fn classify(err: &sqlx::Error) -> OpErrorClass {
        if let sqlx::Error::Database(db) = err {
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return OpErrorClass::DuplicateKey;
            }
        }
        OpErrorClass::Other
    }
}

#[async_trait]
impl DocStore for SqliteStore {
    async fn bulk_write(&self, col: &str, ops: Vec<WriteOp>) -> Result<BulkSummary, StoreError> {
        let table = Self::table(col)?;
        self.ensure(&table).await?;
        let mut summary = BulkSummary::default();

        for (index, op) in ops.into_iter().enumerate() {
            let mut tx = self.pool.begin().await?;
            let outcome: Result<(), sqlx::Error> = match &op {
                WriteOp::InsertOne { document } => {
                    let mut doc = document.clone();
                    let key = self.key_of(&mut doc);
                    match Self::insert_doc(&mut tx, &table, &key, &doc).await {
                        Ok(()) => {
                            summary.inserted += 1;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                WriteOp::UpdateOne {
                    filter,
                    update,
                    upsert,
                } => {
                    let hits = self.load_matching(&mut tx, &table, filter, true).await?;
                    match hits.into_iter().next() {
                        Some((key, mut doc)) => {
                            apply_update(&mut doc, update, false);
                            summary.matched += 1;
                            summary.modified += 1;
                            Self::write_doc(&mut tx, &table, &key, &doc).await
                        }
                        None if *upsert => {
                            let mut doc = upsert_document(filter, update);
                            let key = self.key_of(&mut doc);
                            match Self::insert_doc(&mut tx, &table, &key, &doc).await {
                                Ok(()) => {
                                    summary.upserted += 1;
                                    Ok(())
                                }
                                Err(e) => Err(e),
                            }
                        }
                        None => Ok(()),
                    }
                }
                WriteOp::UpdateMany {
                    filter,
                    update,
                    upsert,
                } => {
                    let hits = self.load_matching(&mut tx, &table, filter, false).await?;
                    if hits.is_empty() && *upsert {
                        let mut doc = upsert_document(filter, update);
                        let key = self.key_of(&mut doc);
                        match Self::insert_doc(&mut tx, &table, &key, &doc).await {
                            Ok(()) => {
                                summary.upserted += 1;
                                Ok(())
                            }
                            Err(e) => Err(e),
                        }
                    } else {
                        let mut result = Ok(());
                        for (key, mut doc) in hits {
                            apply_update(&mut doc, update, false);
                            summary.matched += 1;
                            summary.modified += 1;
                            if let Err(e) = Self::write_doc(&mut tx, &table, &key, &doc).await {
                                result = Err(e);
                                break;
                            }
                        }
                        result
                    }
                }
            };

            match outcome {
                Ok(()) => tx.commit().await?,
                Err(e) => {
                    summary.errors.push(OpError {
                        index,
                        class: Self::classify(&e),
                        message: e.to_string(),
                        op,
                    });
                    // Leave the failed operation uncommitted, keep going.
                    let _ = tx.rollback().await;
                }
            }
        }

        Ok(summary)
    }

    async fn find(&self, col: &str, filter: &Value) -> Result<Vec<Value>, StoreError> {
        let table = Self::table(col)?;
        self.ensure(&table).await?;
        let mut tx = self.pool.begin().await?;
        let hits = self.load_matching(&mut tx, &table, filter, false).await?;
        tx.commit().await?;
        Ok(hits.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn find_one(&self, col: &str, filter: &Value) -> Result<Option<Value>, StoreError> {
        let table = Self::table(col)?;
        self.ensure(&table).await?;
        let mut tx = self.pool.begin().await?;
        let hits = self.load_matching(&mut tx, &table, filter, true).await?;
        tx.commit().await?;
        Ok(hits.into_iter().next().map(|(_, doc)| doc))
    }

    async fn find_one_and_update(
        &self,
        col: &str,
        filter: &Value,
        update: &UpdateDoc,
        upsert: bool,
    ) -> Result<Option<Value>, StoreError> {
        let table = Self::table(col)?;
        self.ensure(&table).await?;
        let mut tx = self.pool.begin().await?;
        let hits = self.load_matching(&mut tx, &table, filter, true).await?;
        let result = match hits.into_iter().next() {
            Some((key, mut doc)) => {
                apply_update(&mut doc, update, false);
                Self::write_doc(&mut tx, &table, &key, &doc).await?;
                Some(doc)
            }
            None if upsert => {
                let mut doc = upsert_document(filter, update);
                let key = self.key_of(&mut doc);
                Self::insert_doc(&mut tx, &table, &key, &doc).await?;
                Some(doc)
            }
            None => None,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn count(&self, col: &str, filter: &Value) -> Result<u64, StoreError> {
        Ok(self.find(col, filter).await?.len() as u64)
    }

    async fn delete_many(&self, col: &str, filter: &Value) -> Result<u64, StoreError> {
        let table = Self::table(col)?;
        self.ensure(&table).await?;
        let mut tx = self.pool.begin().await?;
        let hits = self.load_matching(&mut tx, &table, filter, false).await?;
        let sql = format!("DELETE FROM \"{table}\" WHERE id = ?1");
        let mut removed = 0u64;
        for (key, _) in hits {
            sqlx::query(&sql).bind(&key).execute(&mut *tx).await?;
            removed += 1;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'col_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                name.trim_start_matches("col_").to_string()
            })
            .collect())
    }

    async fn ensure_collection(&self, col: &str) -> Result<(), StoreError> {
        let table = Self::table(col)?;
        self.ensure(&table).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::from_path(dir.path().join("vigil.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_insert_find_round_trip() {
        let (_dir, store) = store().await;
        store
            .bulk_write(
                "t0",
                vec![WriteOp::insert_one(
                    json!({"_id": 100, "jd": 100.0, "rcid": 3}),
                )],
            )
            .await
            .unwrap();
        let doc = store
            .find_one("t0", &json!({"_id": 100}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["jd"], json!(100.0));
    }

    #[tokio::test]
    async fn test_duplicate_insert_classified() {
        let (_dir, store) = store().await;
        let op = WriteOp::insert_one(json!({"_id": 1}));
        let summary = store
            .bulk_write("t0", vec![op.clone(), op])
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].class, OpErrorClass::DuplicateKey);
    }

    #[tokio::test]
    async fn test_upsert_semantics_match_mem() {
        let (_dir, store) = store().await;
        let filter = json!({"_id": "ST1"});
        for channel in ["C1", "C2"] {
            store
                .bulk_write(
                    "stock",
                    vec![WriteOp::upsert_one(
                        filter.clone(),
                        UpdateDoc::new()
                            .set_on_insert("created", json!(1))
                            .add_to_set("channels", json!(channel)),
                    )],
                )
                .await
                .unwrap();
        }
        let doc = store.find_one("stock", &filter).await.unwrap().unwrap();
        assert_eq!(doc["channels"], json!(["C1", "C2"]));
        assert_eq!(doc["created"], json!(1));
    }

    #[tokio::test]
    async fn test_find_one_and_update_counter() {
        let (_dir, store) = store().await;
        for expected in 1..=3i64 {
            let doc = store
                .find_one_and_update(
                    "counter",
                    &json!({"_id": "current_run_id"}),
                    &UpdateDoc::new().inc("value", 1),
                    true,
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(doc["value"], json!(expected));
        }
    }

    #[tokio::test]
    async fn test_invalid_collection_rejected() {
        let (_dir, store) = store().await;
        let err = store.find("no;drop", &json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidCollection(_)));
    }

    #[tokio::test]
    async fn test_collection_names() {
        let (_dir, store) = store().await;
        store.ensure_collection("stock").await.unwrap();
        store.ensure_collection("t2").await.unwrap();
        let names = store.collection_names().await.unwrap();
        assert_eq!(names, vec!["stock".to_string(), "t2".to_string()]);
    }
}
