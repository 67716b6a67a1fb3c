//! The embedding provider: one model plus one vector backend.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};
use crate::models::{EmbeddingModel, create_embedding_model};
use crate::registry::{BackendRegistry, parse_metric};
use crate::vector_store::{
    DistanceMetric, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore,
};

const DIMENSION_SAMPLE: &str = "dimension sample";

/// A unit of text to index. `metadata` should carry `file_path` and, for
/// symbol chunks, `symbol_name`.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// One search hit. `score` is in `[0, 1]`, higher is closer.
///
/// `content` is `None` when the backend does not keep text.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub content: Option<String>,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    pub backend: String,
    pub model_type: String,
    pub model_name: String,
    pub dimension: usize,
    pub document_count: u64,
    pub distance_metric: String,
}

pub struct EmbeddingProvider {
    backend: String,
    collection: String,
    metric: DistanceMetric,
    batch_size: usize,
    concurrency: usize,
    model: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    dimension: OnceCell<usize>,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("backend", &self.backend)
            .field("collection", &self.collection)
            .field("model", &self.model.model_name())
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

impl EmbeddingProvider {
    /// Compose an already-built model and backend.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.distance_metric` is not a known metric.
    pub fn new(
        config: &EmbeddingConfig,
        model: Arc<dyn EmbeddingModel>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        Ok(Self {
            backend: config.vector_store.to_ascii_lowercase(),
            collection: config.collection.clone(),
            metric: parse_metric(&config.distance_metric)?,
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            model,
            store,
            dimension: OnceCell::new(),
        })
    }

    /// Build the model and backend named in `config`.
    ///
    /// # Errors
    ///
    /// Returns configuration errors for unknown model types or backends and any
    /// error from opening the backend.
    pub async fn from_config(config: &EmbeddingConfig, registry: &BackendRegistry) -> Result<Self> {
        let model = create_embedding_model(config)?;
        let store = registry.create(config).await?;
        Self::new(config, model, store)
    }

    #[must_use]
    pub fn model(&self) -> &Arc<dyn EmbeddingModel> {
        &self.model
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Measured vector dimension.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::NotInitialized`] before [`Self::initialize`] has run.
    pub fn dimension(&self) -> Result<usize> {
        self.dimension.get().copied().ok_or(EmbedError::NotInitialized)
    }

    /// Measure the model's real output size and ensure the collection exists.
    /// Runs once; later calls return immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the model or backend fails.
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_initialized().await.map(|_| ())
    }

    async fn ensure_initialized(&self) -> Result<usize> {
        self.dimension
            .get_or_try_init(|| async {
                let sample = self.model.embed(DIMENSION_SAMPLE).await?;
                let dimension = sample.len();
                if dimension == 0 {
                    return Err(EmbedError::EmptyResponse {
                        provider: self.model.model_type(),
                    });
                }
                if dimension != self.model.dimension() {
                    tracing::warn!(
                        model = self.model.model_name(),
                        expected = self.model.dimension(),
                        actual = dimension,
                        "embedding dimension differs from model table, using measured size"
                    );
                }
                self.store
                    .ensure_collection(&self.collection, u64::try_from(dimension).unwrap_or(u64::MAX))
                    .await?;
                tracing::info!(
                    backend = %self.backend,
                    model = self.model.model_name(),
                    dimension,
                    "embedding provider initialized"
                );
                Ok(dimension)
            })
            .await
            .copied()
    }

    /// # Errors
    ///
    /// Returns model errors, or [`EmbedError::DimensionMismatch`] if the vector
    /// length differs from the measured dimension.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let expected = self.ensure_initialized().await?;
        let vector = self.model.embed(text).await?;
        if vector.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Embed each text with at most `concurrency` requests in flight.
    /// Output order matches input order.
    ///
    /// # Errors
    ///
    /// Returns the first embedding error.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        futures::stream::iter(texts)
            .map(|text| self.embed_text(text))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// # Errors
    ///
    /// See [`Self::index_documents`].
    pub async fn index_document(&self, document: Document) -> Result<()> {
        self.index_documents(vec![document]).await.map(|_| ())
    }

    /// Embed and upsert documents in batches of `batch_size`. Returns the number indexed.
    ///
    /// # Errors
    ///
    /// Returns the first model or backend error. Batches written before the
    /// error stay indexed.
    pub async fn index_documents(&self, documents: Vec<Document>) -> Result<usize> {
        let mut indexed = 0;
        let mut documents = documents.into_iter().peekable();
        while documents.peek().is_some() {
            let batch: Vec<Document> = documents.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = self.embed_batch(&texts).await?;
            let points: Vec<VectorPoint> = batch
                .into_iter()
                .zip(vectors)
                .map(|(doc, vector)| {
                    let mut payload = doc.metadata;
                    payload.insert("doc_id".into(), serde_json::Value::from(doc.id.as_str()));
                    payload.insert("content".into(), serde_json::Value::from(doc.content));
                    VectorPoint {
                        id: doc.id,
                        vector,
                        payload,
                    }
                })
                .collect();
            let n = points.len();
            self.store.upsert(&self.collection, points).await?;
            indexed += n;
            tracing::debug!(batch = n, total = indexed, "embedded batch");
        }
        Ok(indexed)
    }

    /// Nearest documents to `query`, best first.
    ///
    /// `filter` keeps only documents whose metadata equals every given value.
    ///
    /// # Errors
    ///
    /// Returns model or backend errors.
    pub async fn search_similar(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&HashMap<String, serde_json::Value>>,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed_text(query).await?;
        let hits = self
            .store
            .search(
                &self.collection,
                vector,
                u64::try_from(limit).unwrap_or(u64::MAX),
                filter.map(metadata_filter),
            )
            .await?;
        Ok(hits.into_iter().map(|hit| self.to_result(hit)).collect())
    }

    fn to_result(&self, hit: ScoredVectorPoint) -> SearchResult {
        let mut metadata = hit.payload;
        let file_path = metadata
            .get("file_path")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let symbol_name = metadata
            .get("symbol_name")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let content = match metadata.remove("content") {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        };
        metadata.remove("doc_id");
        SearchResult {
            id: hit.id,
            file_path,
            symbol_name,
            content,
            score: self.metric.normalize(hit.distance),
            metadata,
        }
    }

    /// # Errors
    ///
    /// Returns backend errors.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(());
        }
        self.store
            .delete_by_ids(&self.collection, vec![id.to_string()])
            .await?;
        Ok(())
    }

    /// Remove every document whose `file_path` metadata equals `file_path`.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    pub async fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        if !self.store.collection_exists(&self.collection).await? {
            return Ok(0);
        }
        let removed = self
            .store
            .delete_by_filter(
                &self.collection,
                VectorFilter::field_equals("file_path", FieldValue::Text(file_path.to_string())),
            )
            .await?;
        tracing::debug!(file = file_path, removed, "deleted file embeddings");
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    /// Drop every document. The collection is recreated if the provider was initialized.
    ///
    /// # Errors
    ///
    /// Returns backend errors.
    pub async fn clear_index(&self) -> Result<()> {
        if self.store.collection_exists(&self.collection).await? {
            self.store.delete_collection(&self.collection).await?;
        }
        if let Some(dimension) = self.dimension.get() {
            self.store
                .ensure_collection(&self.collection, u64::try_from(*dimension).unwrap_or(u64::MAX))
                .await?;
        }
        tracing::info!(collection = %self.collection, "embedding index cleared");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns backend errors.
    pub async fn get_stats(&self) -> Result<ProviderStats> {
        Ok(ProviderStats {
            backend: self.backend.clone(),
            model_type: self.model.model_type().to_string(),
            model_name: self.model.model_name().to_string(),
            dimension: self
                .dimension
                .get()
                .copied()
                .unwrap_or_else(|| self.model.dimension()),
            document_count: self.store.count(&self.collection).await?,
            distance_metric: self.metric.as_str().to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns backend errors.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        Ok(())
    }
}

fn metadata_filter(filter: &HashMap<String, serde_json::Value>) -> VectorFilter {
    let mut must: Vec<FieldCondition> = filter
        .iter()
        .map(|(field, value)| FieldCondition {
            field: field.clone(),
            value: match value {
                serde_json::Value::Bool(b) => FieldValue::Bool(*b),
                serde_json::Value::Number(n) if n.is_i64() => {
                    FieldValue::Integer(n.as_i64().unwrap_or_default())
                }
                serde_json::Value::String(s) => FieldValue::Text(s.clone()),
                other => FieldValue::Text(other.to_string()),
            },
        })
        .collect();
    must.sort_by(|a, b| a.field.cmp(&b.field));
    VectorFilter {
        must,
        must_not: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::memory::MemoryVectorStore;
    use crate::models::HashEmbedding;
    use crate::sqlite::SqliteVectorStore;
    use crate::vector_store::BoxFuture;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("src/config.rs:load_config", "fn load_config: load the toml config file from disk")
                .with_metadata("file_path", "src/config.rs")
                .with_metadata("symbol_name", "load_config")
                .with_metadata("line_start", 10),
            Document::new("src/config.rs:Config", "struct Config holds parsed values")
                .with_metadata("file_path", "src/config.rs")
                .with_metadata("symbol_name", "Config")
                .with_metadata("line_start", 1),
            Document::new("src/math.rs:multiply", "fn multiply matrix kernel tiles")
                .with_metadata("file_path", "src/math.rs")
                .with_metadata("symbol_name", "multiply")
                .with_metadata("line_start", 4),
        ]
    }

    fn memory_provider(config: &EmbeddingConfig) -> EmbeddingProvider {
        let model = Arc::new(HashEmbedding::new("test".into(), 256));
        let store = Arc::new(MemoryVectorStore::new(parse_metric(&config.distance_metric).unwrap()));
        EmbeddingProvider::new(config, model, store).unwrap()
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let provider = memory_provider(&EmbeddingConfig::default());
        assert!(matches!(provider.dimension(), Err(EmbedError::NotInitialized)));
        provider.initialize().await.unwrap();
        provider.initialize().await.unwrap();
        assert_eq!(provider.dimension().unwrap(), 256);
        assert!(provider.store().collection_exists("sextant_chunks").await.unwrap());
    }

    #[tokio::test]
    async fn search_returns_normalized_scores_best_first() {
        let provider = memory_provider(&EmbeddingConfig::default());
        assert_eq!(provider.index_documents(docs()).await.unwrap(), 3);

        let results = provider.search_similar("load config file", 3, None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "src/config.rs:load_config");
        assert_eq!(results[0].file_path, "src/config.rs");
        assert_eq!(results[0].symbol_name.as_deref(), Some("load_config"));
        assert!(results[0].content.as_deref().unwrap().contains("toml"));
        assert_eq!(results[0].metadata["line_start"], serde_json::json!(10));
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn metadata_filter_restricts_results() {
        let provider = memory_provider(&EmbeddingConfig::default());
        provider.index_documents(docs()).await.unwrap();
        let filter = HashMap::from([("file_path".to_string(), serde_json::json!("src/math.rs"))]);
        let results = provider
            .search_similar("config", 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol_name.as_deref(), Some("multiply"));

        let by_line = HashMap::from([("line_start".to_string(), serde_json::json!(1))]);
        let results = provider.search_similar("config", 10, Some(&by_line)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "src/config.rs:Config");
    }

    #[tokio::test]
    async fn delete_by_file_and_document() {
        let provider = memory_provider(&EmbeddingConfig::default());
        assert_eq!(provider.delete_by_file("src/config.rs").await.unwrap(), 0);
        provider.index_documents(docs()).await.unwrap();
        assert_eq!(provider.delete_by_file("src/config.rs").await.unwrap(), 2);
        provider.delete_document("src/math.rs:multiply").await.unwrap();
        assert_eq!(provider.get_stats().await.unwrap().document_count, 0);
    }

    #[tokio::test]
    async fn clear_index_keeps_collection_usable() {
        let provider = memory_provider(&EmbeddingConfig::default());
        provider.index_documents(docs()).await.unwrap();
        provider.clear_index().await.unwrap();
        assert_eq!(provider.get_stats().await.unwrap().document_count, 0);
        provider.index_document(docs().remove(0)).await.unwrap();
        assert_eq!(provider.get_stats().await.unwrap().document_count, 1);
    }

    #[tokio::test]
    async fn stats_describe_provider() {
        let config = EmbeddingConfig {
            distance_metric: "euclidean".into(),
            ..EmbeddingConfig::default()
        };
        let provider = memory_provider(&config);
        provider.index_documents(docs()).await.unwrap();
        let stats = provider.get_stats().await.unwrap();
        assert_eq!(
            stats,
            ProviderStats {
                backend: "memory".into(),
                model_type: "hash".into(),
                model_name: "test".into(),
                dimension: 256,
                document_count: 3,
                distance_metric: "euclidean".into(),
            }
        );
        provider.close().await.unwrap();
    }

    #[tokio::test]
    async fn sqlite_backend_returns_keys_without_content() {
        let config = EmbeddingConfig {
            vector_store: "sqlite".into(),
            distance_metric: "euclidean".into(),
            ..EmbeddingConfig::default()
        };
        let store = Arc::new(SqliteVectorStore::open(":memory:", DistanceMetric::Euclidean).await.unwrap());
        let model = Arc::new(HashEmbedding::new("test".into(), 128));
        let provider = EmbeddingProvider::new(&config, model, store).unwrap();
        provider.index_documents(docs()).await.unwrap();

        let results = provider.search_similar("matrix multiply", 1, None).await.unwrap();
        assert_eq!(results[0].id, "src/math.rs:multiply");
        assert_eq!(results[0].symbol_name.as_deref(), Some("multiply"));
        assert!(results[0].content.is_none());
        assert!(results[0].score > 0.0 && results[0].score <= 1.0);

        let by_line = HashMap::from([("line_start".to_string(), serde_json::json!(1))]);
        let results = provider.search_similar("config", 10, Some(&by_line)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "src/config.rs:Config");
        assert_eq!(results[0].metadata["line_start"], 1);
    }

    #[tokio::test]
    async fn from_config_uses_registry() {
        let provider = EmbeddingProvider::from_config(&EmbeddingConfig::default(), &BackendRegistry::with_defaults())
            .await
            .unwrap();
        provider.index_documents(docs()).await.unwrap();
        assert_eq!(provider.get_stats().await.unwrap().dimension, 384);
    }

    struct CountingModel {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        broken_len: Option<usize>,
    }

    impl CountingModel {
        fn new(broken_len: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                broken_len,
            }
        }
    }

    impl EmbeddingModel for CountingModel {
        fn model_type(&self) -> &'static str {
            "counting"
        }

        fn model_name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            2
        }

        fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                if call > 0 && self.broken_len.is_some() {
                    return Ok(vec![0.0; self.broken_len.unwrap_or_default()]);
                }
                #[expect(clippy::cast_precision_loss)]
                let len = text.len() as f32;
                Ok(vec![len, 1.0])
            })
        }
    }

    #[tokio::test]
    async fn embed_batch_preserves_order_and_bounds_concurrency() {
        let config = EmbeddingConfig {
            concurrency: 2,
            ..EmbeddingConfig::default()
        };
        let model = Arc::new(CountingModel::new(None));
        let provider = EmbeddingProvider::new(&config, model.clone(), Arc::new(MemoryVectorStore::default())).unwrap();
        let texts: Vec<String> = (1..=6).map(|n| "x".repeat(n)).collect();
        let vectors = provider.embed_batch(&texts).await.unwrap();
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(model.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_error() {
        let model = Arc::new(CountingModel::new(Some(3)));
        let provider =
            EmbeddingProvider::new(&EmbeddingConfig::default(), model, Arc::new(MemoryVectorStore::default())).unwrap();
        provider.initialize().await.unwrap();
        let err = provider.embed_text("abc").await.unwrap_err();
        assert!(matches!(err, EmbedError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn batches_respect_batch_size() {
        let config = EmbeddingConfig {
            batch_size: 2,
            ..EmbeddingConfig::default()
        };
        let model = Arc::new(CountingModel::new(None));
        let provider = EmbeddingProvider::new(&config, model.clone(), Arc::new(MemoryVectorStore::default())).unwrap();
        let documents: Vec<Document> = (0..5)
            .map(|i| Document::new(format!("f.rs:s{i}"), "body").with_metadata("file_path", "f.rs"))
            .collect();
        assert_eq!(provider.index_documents(documents).await.unwrap(), 5);
        // sample plus one call per document
        assert_eq!(model.calls.load(Ordering::SeqCst), 6);
        assert_eq!(provider.get_stats().await.unwrap().document_count, 5);
    }
}
