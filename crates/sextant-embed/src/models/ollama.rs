use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};
use crate::models::{EmbeddingModel, table_dimension};
use crate::vector_store::BoxFuture;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const DIMENSIONS: &[(&str, usize)] = &[
    ("qwen3-embedding:8b", 4096),
    ("qwen3-embedding:4b", 2560),
    ("qwen3-embedding:0.6b", 1024),
    ("gte-qwen2-7b-instruct", 3584),
    ("snowflake-arctic-embed2", 1024),
    ("bge-m3", 1024),
    ("mxbai-embed-large", 1024),
    ("nomic-embed-text", 768),
    ("nomic-embed-text:v1.5", 768),
    ("all-minilm", 384),
    ("all-minilm:l6-v2", 384),
];

/// Local Ollama server embeddings.
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: Ollama,
    model: String,
    dimension: usize,
}

impl OllamaEmbedding {
    #[must_use]
    pub fn new(base_url: &str, model: String, fallback_dimension: usize) -> Self {
        let (host, port) = parse_host_port(base_url);
        let dimension = table_dimension(DIMENSIONS, &model.to_ascii_lowercase(), true)
            .unwrap_or(fallback_dimension);
        Self {
            client: Ollama::new(host, port),
            model,
            dimension,
        }
    }

    /// The server URL comes from `extra_config.base_url`, else from
    /// `embedding_api_key` when it looks like a URL, else `localhost:11434`.
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let base_url = config
            .extra_str("base_url")
            .or_else(|| {
                config
                    .embedding_api_key
                    .as_deref()
                    .filter(|k| k.starts_with("http://") || k.starts_with("https://"))
            })
            .unwrap_or(DEFAULT_BASE_URL);
        Self::new(base_url, config.embedding_model_name.clone(), config.dimension)
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::from(text));

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| EmbedError::Other(format!("Ollama embedding request failed: {e}")))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::EmptyResponse { provider: "ollama" })
    }
}

impl EmbeddingModel for OllamaEmbedding {
    fn model_type(&self) -> &'static str {
        "ollama"
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

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), 11434)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn parse_host_port_with_port() {
        assert_eq!(
            parse_host_port("http://localhost:11434"),
            ("http://localhost".to_string(), 11434)
        );
    }

    #[test]
    fn parse_host_port_without_port() {
        assert_eq!(
            parse_host_port("http://localhost"),
            ("http://localhost".to_string(), 11434)
        );
    }

    #[test]
    fn parse_host_port_trailing_slashes() {
        assert_eq!(
            parse_host_port("http://localhost:8080///"),
            ("http://localhost".to_string(), 8080)
        );
    }

    #[test]
    fn parse_host_port_invalid_port_falls_back() {
        assert_eq!(
            parse_host_port("http://localhost:99999"),
            ("http://localhost:99999".to_string(), 11434)
        );
    }

    #[test]
    fn dimensions_exact_and_fuzzy() {
        assert_eq!(OllamaEmbedding::new(DEFAULT_BASE_URL, "nomic-embed-text".into(), 1).dimension(), 768);
        assert_eq!(OllamaEmbedding::new(DEFAULT_BASE_URL, "mxbai-embed-large:latest".into(), 1).dimension(), 1024);
        assert_eq!(OllamaEmbedding::new(DEFAULT_BASE_URL, "custom-embedder".into(), 99).dimension(), 99);
    }

    #[test]
    fn base_url_from_api_key_field() {
        let config = EmbeddingConfig {
            embedding_model_type: "ollama".into(),
            embedding_api_key: Some("http://gpu-box:11500".into()),
            ..EmbeddingConfig::default()
        };
        let m = OllamaEmbedding::from_config(&config);
        assert_eq!(m.model_name(), "all-MiniLM-L12-v2");
        assert_eq!(m.dimension(), 384);
    }

    #[tokio::test]
    async fn embed_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({"model": "nomic-embed-text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "nomic-embed-text",
                "embeddings": [[0.1, 0.2]]
            })))
            .mount(&server)
            .await;

        let m = OllamaEmbedding::new(&server.uri(), "nomic-embed-text".into(), 768);
        assert_eq!(m.embed("def foo(): pass").await.unwrap(), vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let m = OllamaEmbedding::new("http://127.0.0.1:1", "embed".into(), 8);
        assert!(m.embed("test").await.is_err());
    }
}
