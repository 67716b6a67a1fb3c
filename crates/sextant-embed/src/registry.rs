//! Vector backend capability table.
//!
//! Each known backend is listed with whether this build can construct it.
//! Backends compiled out by a feature stay listed as unavailable with a reason,
//! so configuration errors can tell "unknown" apart from "not built in".

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};
use crate::memory::MemoryVectorStore;
use crate::sqlite::SqliteVectorStore;
use crate::vector_store::{BoxFuture, DistanceMetric, VectorStore};

/// Builds a backend from configuration and the parsed distance metric.
pub type BackendFactory =
    fn(EmbeddingConfig, DistanceMetric) -> BoxFuture<'static, Result<Arc<dyn VectorStore>>>;

/// Public view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub name: &'static str,
    pub available: bool,
    pub reason: Option<String>,
}

struct Entry {
    info: BackendInfo,
    factory: Option<BackendFactory>,
}

/// File name of the sqlite backend inside `persist_directory`.
pub const SQLITE_VECTOR_FILE: &str = "vectors.db";

#[cfg(feature = "qdrant")]
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

pub struct BackendRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// `memory` and `sqlite`, plus `qdrant` when built with the `qdrant` feature.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", create_memory);
        registry.register("sqlite", create_sqlite);
        #[cfg(feature = "qdrant")]
        registry.register("qdrant", create_qdrant);
        #[cfg(not(feature = "qdrant"))]
        registry.register_unavailable("qdrant", "built without the `qdrant` feature");
        registry
    }

    /// Add or replace a constructible backend.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) {
        self.entries.insert(
            name,
            Entry {
                info: BackendInfo {
                    name,
                    available: true,
                    reason: None,
                },
                factory: Some(factory),
            },
        );
    }

    /// Record a backend this build cannot construct.
    pub fn register_unavailable(&mut self, name: &'static str, reason: impl Into<String>) {
        self.entries.insert(
            name,
            Entry {
                info: BackendInfo {
                    name,
                    available: false,
                    reason: Some(reason.into()),
                },
                factory: None,
            },
        );
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.info.available)
    }

    /// Every entry, sorted by name.
    #[must_use]
    pub fn list_backends(&self) -> Vec<BackendInfo> {
        self.entries.values().map(|e| e.info.clone()).collect()
    }

    /// Names of constructible backends, sorted.
    #[must_use]
    pub fn available_backends(&self) -> Vec<&'static str> {
        self.entries
            .values()
            .filter(|e| e.info.available)
            .map(|e| e.info.name)
            .collect()
    }

    /// Construct the backend named by `config.vector_store`.
    ///
    /// # Errors
    ///
    /// [`EmbedError::UnknownBackend`] if the name is not registered,
    /// [`EmbedError::BackendUnavailable`] if it is registered but not built in,
    /// or any error from opening the backend.
    pub async fn create(&self, config: &EmbeddingConfig) -> Result<Arc<dyn VectorStore>> {
        let name = config.vector_store.to_ascii_lowercase();
        let Some(entry) = self.entries.get(name.as_str()) else {
            return Err(EmbedError::UnknownBackend {
                name,
                available: self.entries.keys().copied().collect::<Vec<_>>().join(", "),
            });
        };
        let Some(factory) = entry.factory else {
            return Err(EmbedError::BackendUnavailable {
                name,
                reason: entry
                    .info
                    .reason
                    .clone()
                    .unwrap_or_else(|| "not available in this build".into()),
            });
        };
        let metric = parse_metric(&config.distance_metric)?;
        let store = factory(config.clone(), metric).await?;
        tracing::info!(backend = %name, metric = metric.as_str(), "vector store ready");
        Ok(store)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parse `distance_metric`.
///
/// # Errors
///
/// Returns an error naming the valid metrics.
pub fn parse_metric(name: &str) -> Result<DistanceMetric> {
    DistanceMetric::parse(name).ok_or_else(|| {
        EmbedError::Other(format!(
            "unknown distance metric '{name}'. Available: {}",
            DistanceMetric::NAMES.join(", ")
        ))
    })
}

fn create_memory(
    _config: EmbeddingConfig,
    metric: DistanceMetric,
) -> BoxFuture<'static, Result<Arc<dyn VectorStore>>> {
    Box::pin(async move { Ok(Arc::new(MemoryVectorStore::new(metric)) as Arc<dyn VectorStore>) })
}

fn create_sqlite(
    config: EmbeddingConfig,
    metric: DistanceMetric,
) -> BoxFuture<'static, Result<Arc<dyn VectorStore>>> {
    Box::pin(async move {
        let path = match &config.persist_directory {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| EmbedError::Other(format!("cannot create {}: {e}", dir.display())))?;
                sqlite_path(dir)
            }
            None => ":memory:".to_string(),
        };
        let store = SqliteVectorStore::open(&path, metric).await?;
        Ok(Arc::new(store) as Arc<dyn VectorStore>)
    })
}

fn sqlite_path(dir: &Path) -> String {
    dir.join(SQLITE_VECTOR_FILE).to_string_lossy().into_owned()
}

#[cfg(feature = "qdrant")]
fn create_qdrant(
    config: EmbeddingConfig,
    metric: DistanceMetric,
) -> BoxFuture<'static, Result<Arc<dyn VectorStore>>> {
    Box::pin(async move {
        let url = config.extra_str("url").unwrap_or(DEFAULT_QDRANT_URL);
        let ops = crate::qdrant_ops::QdrantOps::new(url, metric)
            .map_err(|e| crate::vector_store::VectorStoreError::Connection(e.to_string()))?;
        Ok(Arc::new(ops) as Arc<dyn VectorStore>)
    })
}
