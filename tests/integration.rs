use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sextant_embed::{BackendRegistry, Document, EmbeddingConfig, EmbeddingProvider};
use sextant_index::chunker::{ChunkConfig, chunk_codebase};
use sextant_index::extractor::TreeSitterExtractor;
use sextant_index::graph::{GraphEdgeType, GraphIndexer, GraphStore, SqliteGraphStore};
use sextant_index::ignore_policy::IgnorePolicy;
use sextant_index::languages::LanguageRegistry;
use sextant_index::symbol_store::SymbolStore;
use sextant_index::unified::UnifiedExtractor;

const SHAPES: &str = r#"class Shape:
    """Base of every drawable shape."""

    def area(self):
        return 0


class Circle(Shape):
    def __init__(self, radius):
        self.radius = radius

    def area(self):
        return square(self.radius) * 3.14159


def square(x):
    return x * x
"#;

const TOKENS: &str = r#"def tokenize(source):
    """Split source text into lexer tokens."""
    tokens = []
    for word in source.split():
        tokens.append(word)
    return tokens


def parse_tokens(tokens):
    return [token.upper() for token in tokens]
"#;

struct Fixture {
    dir: tempfile::TempDir,
    symbols: SymbolStore,
    graph: GraphIndexer,
    extractor: Arc<TreeSitterExtractor>,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shapes.py"), SHAPES).unwrap();
        std::fs::write(dir.path().join("tokens.py"), TOKENS).unwrap();
        std::fs::create_dir(dir.path().join(".sextant")).unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/dep.py"), "def vendored():\n    pass\n").unwrap();

        let registry = Arc::new(LanguageRegistry::with_builtins());
        let extractor = Arc::new(TreeSitterExtractor::new(registry));
        let data = dir.path().join(".sextant");
        let symbols = SymbolStore::open(
            data.join("symbols.db").to_str().unwrap(),
            dir.path(),
            Arc::clone(&extractor),
            IgnorePolicy::new(),
        )
        .await
        .unwrap();
        let graph_store: Arc<dyn GraphStore> =
            Arc::new(SqliteGraphStore::open(data.join("graph.db").to_str().unwrap()).await.unwrap());
        let graph = GraphIndexer::new(
            graph_store,
            Arc::new(UnifiedExtractor::new(Arc::clone(&extractor))),
            IgnorePolicy::new(),
        );
        Self {
            dir,
            symbols,
            graph,
            extractor,
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn rewrite(&self, file: &str, content: &str) {
        let path = self.root().join(file);
        std::fs::write(&path, content).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }
}

#[cfg(feature = "lang-python")]
#[tokio::test]
async fn repeated_pass_is_idempotent() {
    let fx = Fixture::new().await;
    let first = fx.symbols.index(false).await.unwrap();
    assert_eq!(first.total_files, 2);
    assert_eq!(first.files_indexed, 2);
    assert!(first.errors.is_empty());
    fx.graph.index(fx.root(), false).await.unwrap();

    let symbol_stats = fx.symbols.get_stats().await.unwrap();
    let graph_stats = fx.graph.store().stats().await.unwrap();

    let second = fx.symbols.index(false).await.unwrap();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.files_skipped, 2);
    let graph_second = fx.graph.index(fx.root(), false).await.unwrap();
    assert_eq!(graph_second.files_indexed, 0);

    let after = fx.symbols.get_stats().await.unwrap();
    assert_eq!(after.total_symbols, symbol_stats.total_symbols);
    assert_eq!(after.total_patterns, symbol_stats.total_patterns);
    assert_eq!(fx.graph.store().stats().await.unwrap(), graph_stats);
}

#[cfg(feature = "lang-python")]
#[tokio::test]
async fn only_changed_files_are_reindexed() {
    let fx = Fixture::new().await;
    fx.symbols.index(false).await.unwrap();
    fx.graph.index(fx.root(), false).await.unwrap();

    fx.rewrite("tokens.py", "def tokenize(source):\n    return source.split()\n\n\ndef detokenize(tokens):\n    return ' '.join(tokens)\n");

    let stats = fx.symbols.index(false).await.unwrap();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_skipped, 1);
    let report = fx.graph.index(fx.root(), false).await.unwrap();
    assert_eq!(report.files_indexed, 1);

    let names: Vec<String> = fx
        .symbols
        .find_symbols_in_file("tokens.py")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert!(names.contains(&"detokenize".to_string()));
    assert!(!names.contains(&"parse_tokens".to_string()));
    assert!(
        fx.graph
            .store()
            .get_node_by_id("symbol:tokens.py:parse_tokens")
            .await
            .unwrap()
            .is_none()
    );
}

#[cfg(feature = "lang-python")]
#[tokio::test]
async fn editing_a_referenced_file_keeps_cross_file_edges() {
    let fx = Fixture::new().await;
    std::fs::write(
        fx.root().join("ring.py"),
        "class Ring(Circle):\n    def inner(self):\n        return square(2)\n",
    )
    .unwrap();
    fx.graph.index(fx.root(), false).await.unwrap();
    let store = fx.graph.store();
    let before = store.get_all_edges().await.unwrap();
    assert!(before.iter().any(|e| e.src == "symbol:ring.py:Ring" && e.dst == "symbol:shapes.py:Circle"));

    fx.rewrite("shapes.py", &format!("{SHAPES}\n\nPI = 3.14159\n"));
    let report = fx.graph.index(fx.root(), false).await.unwrap();
    assert_eq!(report.files_indexed, 1);

    let after = store.get_all_edges().await.unwrap();
    let cross: Vec<_> = after.iter().filter(|e| e.src.starts_with("symbol:ring.py")).collect();
    assert!(cross.iter().any(|e| e.dst == "symbol:shapes.py:Circle" && e.edge_type == GraphEdgeType::Inherits));
    assert!(cross.iter().any(|e| e.dst == "symbol:shapes.py:square" && e.edge_type == GraphEdgeType::Calls));
}

#[cfg(feature = "lang-python")]
#[tokio::test]
async fn deleted_files_leave_no_rows() {
    let fx = Fixture::new().await;
    fx.symbols.index(false).await.unwrap();
    fx.graph.index(fx.root(), false).await.unwrap();

    std::fs::remove_file(fx.root().join("shapes.py")).unwrap();
    let stats = fx.symbols.index(false).await.unwrap();
    assert_eq!(stats.files_deleted, 1);
    let report = fx.graph.index(fx.root(), false).await.unwrap();
    assert_eq!(report.files_deleted, 1);

    assert!(fx.symbols.get_file("shapes.py").await.unwrap().is_none());
    assert!(fx.symbols.find_symbols_in_file("shapes.py").await.unwrap().is_empty());
    assert!(fx.graph.store().get_nodes_by_file("shapes.py").await.unwrap().is_empty());
    let dangling = fx
        .graph
        .store()
        .get_all_edges()
        .await
        .unwrap()
        .into_iter()
        .any(|e| e.src.contains("shapes.py") || e.dst.contains("shapes.py"));
    assert!(!dangling);
}

#[cfg(feature = "lang-python")]
#[tokio::test]
async fn graph_links_classes_methods_and_calls() {
    let fx = Fixture::new().await;
    let report = fx.graph.index(fx.root(), false).await.unwrap();
    assert_eq!(report.files_total, 2);
    assert!(report.nodes_written > 0);

    let store = fx.graph.store();
    let circle = store
        .get_node_by_id("symbol:shapes.py:Circle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(circle.node_type, "class");

    let inherits = store
        .get_neighbors("symbol:shapes.py:Circle", Some(vec![GraphEdgeType::Inherits]), 1)
        .await
        .unwrap();
    assert_eq!(inherits.len(), 1);
    assert_eq!(inherits[0].dst, "symbol:shapes.py:Shape");

    let calls = store
        .get_neighbors("symbol:shapes.py:Circle.area", Some(vec![GraphEdgeType::Calls]), 1)
        .await
        .unwrap();
    assert!(calls.iter().any(|e| e.dst == "symbol:shapes.py:square"));

    let hits = store
        .search_symbols("token", 10, Some(vec!["function".to_string()]))
        .await
        .unwrap();
    assert_eq!(hits[0].name, "tokenize");
    assert!(store.get_nodes_by_file("node_modules/dep.py").await.unwrap().is_empty());
}

#[cfg(feature = "lang-python")]
#[tokio::test]
async fn symbol_queries_see_classes_and_methods() {
    let fx = Fixture::new().await;
    fx.symbols.index(false).await.unwrap();
    let circle = fx
        .symbols
        .find_by_name_pattern("Circ*", 10)
        .await
        .unwrap();
    assert_eq!(circle.len(), 1);
    assert_eq!(circle[0].symbol_type, "class");
    let methods = fx.symbols.find_by_type("method", 50).await.unwrap();
    assert!(methods.iter().any(|m| m.parent_symbol.as_deref() == Some("Circle")));
}

#[cfg(feature = "lang-python")]
#[tokio::test]
async fn embedded_chunks_are_searchable() {
    let fx = Fixture::new().await;
    let chunks = chunk_codebase(fx.root(), &fx.extractor, &ChunkConfig::default(), &IgnorePolicy::new());
    assert!(chunks.iter().all(|c| !c.file_path.starts_with("node_modules")));
    assert!(chunks.iter().any(|c| c.symbol_name.as_deref() == Some("tokenize")));

    let config = EmbeddingConfig {
        dimension: 512,
        ..EmbeddingConfig::default()
    };
    let provider = EmbeddingProvider::from_config(&config, &BackendRegistry::with_defaults())
        .await
        .unwrap();
    let documents: Vec<Document> = chunks
        .into_iter()
        .map(|c| Document {
            metadata: c.document_metadata().into_iter().collect(),
            id: c.id,
            content: c.content,
        })
        .collect();
    let total = documents.len();
    assert_eq!(provider.index_documents(documents).await.unwrap(), total);

    let results = provider
        .search_similar("split source text into lexer tokens", 3, None)
        .await
        .unwrap();
    assert_eq!(results[0].file_path, "tokens.py");
    assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));

    assert!(provider.delete_by_file("tokens.py").await.unwrap() > 0);
    let stats = provider.get_stats().await.unwrap();
    assert_eq!(stats.model_type, "hash");
    assert!(stats.document_count < u64::try_from(total).unwrap());
}
