use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};
use crate::models::{EmbeddingModel, require_api_key, table_dimension};
use crate::vector_store::BoxFuture;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl std::fmt::Debug for OpenAiEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedding")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedding {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: String, model: String, fallback_dimension: usize) -> Result<Self> {
        let dimension = table_dimension(DIMENSIONS, &model, false).unwrap_or(fallback_dimension);
        Ok(Self {
            client: crate::http::default_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dimension,
        })
    }

    /// Reads `embedding_api_key`, `embedding_model_name` and `extra_config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = require_api_key(config, "openai")?;
        Self::new(
            config.extra_str("base_url").unwrap_or(DEFAULT_BASE_URL),
            api_key,
            config.embedding_model_name.clone(),
            config.dimension,
        )
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            input: text,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!("OpenAI embedding API error {status}: {text}");
            return Err(EmbedError::Api {
                provider: "openai",
                status: status.as_u16(),
            });
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbedError::EmptyResponse { provider: "openai" })
    }
}

impl EmbeddingModel for OpenAiEmbedding {
    fn model_type(&self) -> &'static str {
        "openai"
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
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn model(server: &MockServer) -> OpenAiEmbedding {
        OpenAiEmbedding::new(
            &format!("{}/v1", server.uri()),
            "sk-test".into(),
            "text-embedding-3-small".into(),
            384,
        )
        .unwrap()
    }

    #[test]
    fn dimension_table() {
        let m = OpenAiEmbedding::new(DEFAULT_BASE_URL, "k".into(), "text-embedding-3-large".into(), 384)
            .unwrap();
        assert_eq!(m.dimension(), 3072);
        let custom = OpenAiEmbedding::new(DEFAULT_BASE_URL, "k".into(), "my-model".into(), 384).unwrap();
        assert_eq!(custom.dimension(), 384);
    }

    #[test]
    fn debug_redacts_key() {
        let m = OpenAiEmbedding::new(DEFAULT_BASE_URL, "sk-secret".into(), "m".into(), 8).unwrap();
        let dbg = format!("{m:?}");
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn embedding_request_serialization() {
        let body = EmbeddingRequest {
            input: "hello",
            model: "text-embedding-3-small",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"input\":\"hello\""));
        assert!(json.contains("\"model\":\"text-embedding-3-small\""));
    }

    #[tokio::test]
    async fn embed_posts_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "text-embedding-3-small"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let v = model(&server).embed("fn main() {}").await.unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn error_status_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = model(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, EmbedError::Api { provider: "openai", status: 429 }));
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let err = model(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, EmbedError::EmptyResponse { provider: "openai" }));
    }

    #[test]
    fn from_config_reads_base_url() {
        let mut config = EmbeddingConfig {
            embedding_model_type: "openai".into(),
            embedding_model_name: "text-embedding-ada-002".into(),
            embedding_api_key: Some("k".into()),
            ..EmbeddingConfig::default()
        };
        config
            .extra_config
            .insert("base_url".into(), serde_json::json!("http://localhost:9/v1/"));
        let m = OpenAiEmbedding::from_config(&config).unwrap();
        assert_eq!(m.base_url, "http://localhost:9/v1");
        assert_eq!(m.dimension(), 1536);
    }
}
