//! Text-to-vector models.

mod cohere;
mod hash;
mod ollama;
mod openai;

use std::sync::Arc;

pub use cohere::CohereEmbedding;
pub use hash::HashEmbedding;
pub use ollama::OllamaEmbedding;
pub use openai::OpenAiEmbedding;

use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};
use crate::vector_store::BoxFuture;

/// Model type keys accepted by [`create_embedding_model`].
pub const MODEL_TYPES: &[&str] = &["cohere", "hash", "ollama", "openai"];

pub trait EmbeddingModel: Send + Sync {
    /// Short type key, e.g. `"openai"`.
    fn model_type(&self) -> &'static str;

    fn model_name(&self) -> &str;

    /// Expected output dimension, from the model's table or the configured fallback.
    fn dimension(&self) -> usize;

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;
}

/// Build the model named by `config.embedding_model_type`.
///
/// # Errors
///
/// Returns [`EmbedError::UnknownModelType`] for unrecognised types, or an error if
/// a cloud model has no API key or its HTTP client cannot be built.
pub fn create_embedding_model(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingModel>> {
    let model: Arc<dyn EmbeddingModel> = match config.embedding_model_type.to_ascii_lowercase().as_str() {
        "hash" => Arc::new(HashEmbedding::new(
            config.embedding_model_name.clone(),
            config.dimension,
        )),
        "openai" => Arc::new(OpenAiEmbedding::from_config(config)?),
        "cohere" => Arc::new(CohereEmbedding::from_config(config)?),
        "ollama" => Arc::new(OllamaEmbedding::from_config(config)),
        "sentence-transformers" => {
            return Err(EmbedError::Other(format!(
                "sentence-transformers needs an in-process model runtime, which sextant does not ship. \
                 Use one of: {}",
                MODEL_TYPES.join(", ")
            )));
        }
        other => {
            return Err(EmbedError::UnknownModelType {
                name: other.to_string(),
                available: MODEL_TYPES.join(", "),
            });
        }
    };
    tracing::debug!(
        model_type = model.model_type(),
        model = model.model_name(),
        dimension = model.dimension(),
        "embedding model created"
    );
    Ok(model)
}

/// Look `name` up in a dimension table. With `fuzzy`, a key containing the name
/// or contained in it also matches.
pub(crate) fn table_dimension(table: &[(&str, usize)], name: &str, fuzzy: bool) -> Option<usize> {
    if let Some((_, dim)) = table.iter().find(|(key, _)| *key == name) {
        return Some(*dim);
    }
    if !fuzzy || name.is_empty() {
        return None;
    }
    table
        .iter()
        .find(|(key, _)| key.contains(name) || name.contains(key))
        .map(|(_, dim)| *dim)
}

pub(crate) fn require_api_key(config: &EmbeddingConfig, provider: &str) -> Result<String> {
    config
        .embedding_api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| EmbedError::Other(format!("{provider} embedding model requires an API key")))
}
