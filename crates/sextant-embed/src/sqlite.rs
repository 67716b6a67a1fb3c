//! SQLite vector backend that keeps vectors and correlation keys only.
//!
//! Chunk text is never written here. A hit carries `doc_id`, `file_path`,
//! `symbol_name` and any scalar metadata the document had, and callers read
//! the body back through the symbol or graph store.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::Result;
use crate::vector_store::{
    BoxFuture, DistanceMetric, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError, matches_filter, rank,
};

#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    metric: DistanceMetric,
}

type PointRow = (String, String, Option<String>, String, Vec<u8>);

/// Payload keys held in their own columns or never stored.
const RESERVED_KEYS: [&str; 4] = ["doc_id", "file_path", "symbol_name", "content"];

impl SqliteVectorStore {
    /// Open (or create) the database at `path` and run migrations. `":memory:"`
    /// gives a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str, metric: DistanceMetric) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool, metric })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn exists(&self, collection: &str) -> std::result::Result<bool, sqlx::Error> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_collection WHERE name = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n > 0)
    }

    async fn rows(&self, collection: &str) -> std::result::Result<Vec<PointRow>, sqlx::Error> {
        sqlx::query_as(
            "SELECT doc_id, file_path, symbol_name, metadata, vector FROM vector_point \
             WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
    }
}

/// Scalar payload entries outside the key columns, as a JSON object.
fn scalar_metadata(payload: &HashMap<String, serde_json::Value>) -> serde_json::Map<String, serde_json::Value> {
    payload
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .filter(|(_, v)| v.is_string() || v.is_number() || v.is_boolean())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn payload(
    doc_id: &str,
    file_path: &str,
    symbol_name: Option<&str>,
    metadata: &str,
) -> HashMap<String, serde_json::Value> {
    let mut payload: HashMap<String, serde_json::Value> =
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(metadata) {
            Ok(map) => map.into_iter().collect(),
            Err(e) => {
                tracing::warn!(doc_id, "ignoring unreadable point metadata: {e}");
                HashMap::new()
            }
        };
    payload.extend([
        ("doc_id".to_string(), serde_json::Value::from(doc_id)),
        ("file_path".to_string(), serde_json::Value::from(file_path)),
    ]);
    if let Some(symbol) = symbol_name {
        payload.insert("symbol_name".into(), serde_json::Value::from(symbol));
    }
    payload
}

fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|c| c.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

impl VectorStore for SqliteVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let dimension = i64::try_from(vector_size)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            sqlx::query(
                "INSERT INTO vector_collection (name, dimension) VALUES (?, ?) \
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(&collection)
            .bind(dimension)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn collection_exists(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, std::result::Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn delete_collection(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            sqlx::query("DELETE FROM vector_collection WHERE name = ?")
                .bind(&collection)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let upsert_err = |e: sqlx::Error| VectorStoreError::Upsert(e.to_string());
            if !self.exists(&collection).await.map_err(upsert_err)? {
                return Err(VectorStoreError::Upsert(format!(
                    "collection {collection} not found"
                )));
            }
            let mut tx = self.pool.begin().await.map_err(upsert_err)?;
            for p in points {
                let file_path = p
                    .payload
                    .get("file_path")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                let symbol_name = p
                    .payload
                    .get("symbol_name")
                    .and_then(serde_json::Value::as_str);
                let dimension = i64::try_from(p.vector.len())
                    .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
                let metadata = serde_json::Value::Object(scalar_metadata(&p.payload)).to_string();
                sqlx::query(
                    "INSERT INTO vector_point \
                     (collection, doc_id, file_path, symbol_name, metadata, dimension, vector) \
                     VALUES (?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(collection, doc_id) DO UPDATE SET \
                     file_path = excluded.file_path, symbol_name = excluded.symbol_name, \
                     metadata = excluded.metadata, dimension = excluded.dimension, \
                     vector = excluded.vector",
                )
                .bind(&collection)
                .bind(&p.id)
                .bind(file_path)
                .bind(symbol_name)
                .bind(metadata)
                .bind(dimension)
                .bind(encode(&p.vector))
                .execute(&mut *tx)
                .await
                .map_err(upsert_err)?;
            }
            tx.commit().await.map_err(upsert_err)?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, std::result::Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let search_err = |e: sqlx::Error| VectorStoreError::Search(e.to_string());
            if !self.exists(&collection).await.map_err(search_err)? {
                return Err(VectorStoreError::Search(format!(
                    "collection {collection} not found"
                )));
            }
            let f = filter.unwrap_or_default();
            let mut scored = Vec::new();
            for (doc_id, file_path, symbol_name, metadata, blob) in
                self.rows(&collection).await.map_err(search_err)?
            {
                let payload = payload(&doc_id, &file_path, symbol_name.as_deref(), &metadata);
                if !matches_filter(&payload, &f) {
                    continue;
                }
                let stored = decode(&blob);
                if stored.len() != vector.len() {
                    tracing::debug!(doc_id = %doc_id, "skipping vector with mismatched dimension");
                    continue;
                }
                scored.push(ScoredVectorPoint {
                    distance: self.metric.distance(&vector, &stored),
                    id: doc_id,
                    payload,
                });
            }
            Ok(rank(scored, limit))
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let delete_err = |e: sqlx::Error| VectorStoreError::Delete(e.to_string());
            let mut tx = self.pool.begin().await.map_err(delete_err)?;
            for id in &ids {
                sqlx::query("DELETE FROM vector_point WHERE collection = ? AND doc_id = ?")
                    .bind(&collection)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(delete_err)?;
            }
            tx.commit().await.map_err(delete_err)?;
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, std::result::Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let delete_err = |e: sqlx::Error| VectorStoreError::Delete(e.to_string());
            let doomed: Vec<String> = self
                .rows(&collection)
                .await
                .map_err(delete_err)?
                .into_iter()
                .filter(|(doc_id, file_path, symbol_name, metadata, _)| {
                    matches_filter(
                        &payload(doc_id, file_path, symbol_name.as_deref(), metadata),
                        &filter,
                    )
                })
                .map(|(doc_id, ..)| doc_id)
                .collect();
            let removed = u64::try_from(doomed.len())
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            self.delete_by_ids(&collection, doomed).await?;
            Ok(removed)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, std::result::Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_point WHERE collection = ?")
                .bind(&collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Count(e.to_string()))?;
            u64::try_from(n).map_err(|e| VectorStoreError::Count(e.to_string()))
        })
    }

    fn close(&self) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
        Box::pin(async move {
            self.pool.close().await;
            Ok(())
        })
    }
}
