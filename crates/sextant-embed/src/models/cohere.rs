use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};
use crate::models::{EmbeddingModel, require_api_key, table_dimension};
use crate::vector_store::BoxFuture;

const DEFAULT_BASE_URL: &str = "https://api.cohere.ai";
const DEFAULT_INPUT_TYPE: &str = "search_document";

const DIMENSIONS: &[(&str, usize)] = &[
    ("embed-english-v3.0", 1024),
    ("embed-multilingual-v3.0", 1024),
    ("embed-english-light-v3.0", 384),
    ("embed-multilingual-light-v3.0", 384),
];

/// Cohere `/v1/embed` endpoint.
#[derive(Clone)]
pub struct CohereEmbedding {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    input_type: String,
    dimension: usize,
}

impl std::fmt::Debug for CohereEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CohereEmbedding")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("input_type", &self.input_type)
            .finish_non_exhaustive()
    }
}

impl CohereEmbedding {
    /// Reads `embedding_api_key`, `embedding_model_name`, `extra_config.base_url`
    /// and `extra_config.input_type` (default `search_document`).
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client cannot be built.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = require_api_key(config, "cohere")?;
        let model = config.embedding_model_name.clone();
        Ok(Self {
            client: crate::http::default_client()?,
            base_url: config
                .extra_str("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            input_type: config
                .extra_str("input_type")
                .unwrap_or(DEFAULT_INPUT_TYPE)
                .to_string(),
            dimension: table_dimension(DIMENSIONS, &model, false).unwrap_or(config.dimension),
            model,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbedRequest {
            texts: [text],
            model: &self.model,
            input_type: &self.input_type,
        };
        let response = self
            .client
            .post(format!("{}/v1/embed", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!("Cohere embedding API error {status}: {text}");
            return Err(EmbedError::Api {
                provider: "cohere",
                status: status.as_u16(),
            });
        }

        let resp: EmbedResponse = serde_json::from_str(&text)?;
        resp.embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::EmptyResponse { provider: "cohere" })
    }
}

impl EmbeddingModel for CohereEmbedding {
    fn model_type(&self) -> &'static str {
        "cohere"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(self.request(text))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: [&'a str; 1],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
