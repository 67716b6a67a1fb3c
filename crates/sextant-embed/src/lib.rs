//! Embedding models and vector backends for semantic code search.
//!
//! Two independent axes: an [`models::EmbeddingModel`] turns text into vectors and a
//! [`vector_store::VectorStore`] keeps and searches them. [`provider::EmbeddingProvider`]
//! composes one of each and returns similarity scores in `[0, 1]`.

pub mod config;
pub mod error;
mod http;
pub mod memory;
pub mod models;
pub mod provider;
#[cfg(feature = "qdrant")]
pub mod qdrant_ops;
pub mod registry;
pub mod sqlite;
pub mod vector_store;

pub use config::EmbeddingConfig;
pub use error::{EmbedError, Result};
pub use memory::MemoryVectorStore;
pub use models::{EmbeddingModel, create_embedding_model};
pub use provider::{Document, EmbeddingProvider, ProviderStats, SearchResult};
#[cfg(feature = "qdrant")]
pub use qdrant_ops::QdrantOps;
pub use registry::{BackendInfo, BackendRegistry};
pub use sqlite::SqliteVectorStore;
pub use vector_store::{
    DistanceMetric, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};
