use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Selects the embedding model and the vector backend.
///
/// Both axes are string keys: `embedding_model_type` is resolved by
/// [`crate::models::create_embedding_model`] and `vector_store` by
/// [`crate::registry::BackendRegistry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub vector_store: String,
    /// Directory for persistent backends. `None` keeps `sqlite` in memory.
    pub persist_directory: Option<PathBuf>,
    pub distance_metric: String,
    pub embedding_model_type: String,
    pub embedding_model_name: String,
    /// API key for cloud models. For `ollama` this may hold the base URL instead.
    pub embedding_api_key: Option<String>,
    /// Fallback dimension for models missing from the built-in tables.
    pub dimension: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub collection: String,
    /// Backend and model specific keys such as `url`, `base_url` or `input_type`.
    pub extra_config: HashMap<String, serde_json::Value>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            vector_store: "memory".into(),
            persist_directory: None,
            distance_metric: "cosine".into(),
            embedding_model_type: "hash".into(),
            embedding_model_name: "all-MiniLM-L12-v2".into(),
            embedding_api_key: None,
            dimension: 384,
            batch_size: 32,
            concurrency: 8,
            collection: "sextant_chunks".into(),
            extra_config: HashMap::new(),
        }
    }
}

impl EmbeddingConfig {
    /// String value of an `extra_config` key.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra_config.get(key).and_then(serde_json::Value::as_str)
    }
}
