use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use sextant_embed::{BackendRegistry, Document, EmbeddingProvider};
use sextant_index::chunker::{CodeChunk, chunk_codebase};
use sextant_index::extractor::TreeSitterExtractor;
use sextant_index::graph::{GraphIndexReport, GraphIndexer, GraphStore, SqliteGraphStore};
use sextant_index::ignore_policy::IgnorePolicy;
use sextant_index::languages::LanguageRegistry;
use sextant_index::symbol_store::{IndexStats, SymbolStore};
use sextant_index::unified::UnifiedExtractor;

use crate::config::Config;

const SYMBOLS_DB: &str = "symbols.db";
const GRAPH_DB: &str = "graph.db";

/// One repository root with the shared registry, extractor and ignore policy.
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub registry: Arc<LanguageRegistry>,
    pub extractor: Arc<TreeSitterExtractor>,
    pub ignore: IgnorePolicy,
}

impl Workspace {
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or the data directory cannot be created.
    pub fn open(root: &Path, config: Config) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("repository root not found: {}", root.display()))?;
        let data_dir = config.data_dir(&root);
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let registry = Arc::new(LanguageRegistry::with_builtins());
        let extractor = Arc::new(TreeSitterExtractor::new(Arc::clone(&registry)));
        let ignore = config.ignore_policy();
        Ok(Self {
            root,
            config,
            registry,
            extractor,
            ignore,
        })
    }

    fn db_path(&self, file: &str) -> String {
        self.config
            .data_dir(&self.root)
            .join(file)
            .to_string_lossy()
            .into_owned()
    }

    /// # Errors
    ///
    /// Returns an error if the symbol database cannot be opened.
    pub async fn symbol_store(&self) -> anyhow::Result<SymbolStore> {
        SymbolStore::open(
            &self.db_path(SYMBOLS_DB),
            &self.root,
            Arc::clone(&self.extractor),
            self.ignore.clone(),
        )
        .await
        .context("failed to open symbol store")
    }

    /// # Errors
    ///
    /// Returns an error if the graph database cannot be opened.
    pub async fn graph_store(&self) -> anyhow::Result<Arc<dyn GraphStore>> {
        let store = SqliteGraphStore::open(&self.db_path(GRAPH_DB))
            .await
            .context("failed to open graph store")?;
        Ok(Arc::new(store))
    }

    /// # Errors
    ///
    /// Returns an error if the graph database cannot be opened.
    pub async fn graph_indexer(&self) -> anyhow::Result<GraphIndexer> {
        let unified = Arc::new(UnifiedExtractor::new(Arc::clone(&self.extractor)));
        Ok(GraphIndexer::new(
            self.graph_store().await?,
            unified,
            self.ignore.clone(),
        ))
    }

    /// Symbol pass followed by graph pass.
    ///
    /// # Errors
    ///
    /// Returns an error if either store fails or a pass is already running.
    pub async fn index(
        &self,
        symbols: &SymbolStore,
        graph: &GraphIndexer,
        force: bool,
    ) -> anyhow::Result<(IndexStats, GraphIndexReport)> {
        let stats = symbols.index(force).await.context("symbol indexing failed")?;
        let report = graph
            .index(&self.root, force)
            .await
            .context("graph indexing failed")?;
        Ok((stats, report))
    }

    #[must_use]
    pub fn chunks(&self) -> Vec<CodeChunk> {
        chunk_codebase(&self.root, &self.extractor, &self.config.chunking, &self.ignore)
    }

    /// # Errors
    ///
    /// Returns configuration errors for unknown backends or model types.
    pub async fn embedding_provider(&self) -> anyhow::Result<EmbeddingProvider> {
        let config = self.config.embedding_for(&self.root);
        EmbeddingProvider::from_config(&config, &BackendRegistry::with_defaults())
            .await
            .context("failed to create embedding provider")
    }

    /// Chunk the tree and write every chunk to the vector index.
    ///
    /// Without `force`, each chunked file's previous vectors are removed first.
    ///
    /// # Errors
    ///
    /// Returns model or backend errors.
    pub async fn embed(&self, provider: &EmbeddingProvider, force: bool) -> anyhow::Result<usize> {
        let chunks = self.chunks();
        provider.initialize().await.context("failed to initialize embedding provider")?;
        if force {
            provider.clear_index().await.context("failed to clear vector index")?;
        } else {
            let files: BTreeSet<&str> = chunks.iter().map(|c| c.file_path.as_str()).collect();
            for file in files {
                provider.delete_by_file(file).await?;
            }
        }
        let documents = chunks.into_iter().map(chunk_document).collect();
        let indexed = provider
            .index_documents(documents)
            .await
            .context("failed to index chunks")?;
        tracing::info!(indexed, "embedding complete");
        Ok(indexed)
    }
}

fn chunk_document(chunk: CodeChunk) -> Document {
    let metadata = chunk.document_metadata().into_iter().collect();
    Document {
        id: chunk.id,
        content: chunk.content,
        metadata,
    }
}
