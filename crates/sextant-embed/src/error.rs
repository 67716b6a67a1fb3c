use crate::vector_store::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("unknown vector store '{name}'. Available: {available}")]
    UnknownBackend { name: String, available: String },

    #[error("unknown embedding model type '{name}'. Available: {available}")]
    UnknownModelType { name: String, available: String },

    #[error("vector store '{name}' is unavailable: {reason}")]
    BackendUnavailable { name: String, reason: String },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{provider} embedding request failed (status {status})")]
    Api { provider: &'static str, status: u16 },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding provider is not initialized")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EmbedError>;
