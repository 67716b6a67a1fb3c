//! Per-repository code graph: symbol nodes and typed relationship edges.
//!
//! Nodes keep line ranges, never bodies. A reader that needs the source of
//! a node opens the file and slices `line..=end_line`.

pub mod indexer;
pub mod memory;
pub mod sqlite;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::extractor::EdgeType;

pub use indexer::{GraphIndexReport, GraphIndexer};
pub use memory::MemoryGraphStore;
pub use sqlite::SqliteGraphStore;

/// Boxed `Send` future returned by the async store and hover traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphEdgeType {
    Calls,
    Inherits,
    Implements,
    Composition,
    Contains,
    Imports,
}

impl GraphEdgeType {
    pub const ALL: [Self; 6] = [
        Self::Calls,
        Self::Inherits,
        Self::Implements,
        Self::Composition,
        Self::Contains,
        Self::Imports,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "CALLS",
            Self::Inherits => "INHERITS",
            Self::Implements => "IMPLEMENTS",
            Self::Composition => "COMPOSITION",
            Self::Contains => "CONTAINS",
            Self::Imports => "IMPORTS",
        }
    }
}

impl std::fmt::Display for GraphEdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphEdgeType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| IndexError::Other(format!("unknown edge type '{s}'")))
    }
}

impl From<EdgeType> for GraphEdgeType {
    fn from(value: EdgeType) -> Self {
        match value {
            EdgeType::Calls => Self::Calls,
            EdgeType::Inherits => Self::Inherits,
            EdgeType::Implements => Self::Implements,
            EdgeType::Composition => Self::Composition,
        }
    }
}

/// A symbol or file in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// `symbol:{file}:{qualified_name}` or `file:{path}`.
    pub node_id: String,
    /// `file`, `class`, `function`, `method`, `external_type`, ...
    pub node_type: String,
    pub name: String,
    pub file: String,
    pub line: Option<i64>,
    pub end_line: Option<i64>,
    pub lang: Option<String>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub parent_id: Option<String>,
    /// Key of the matching vector-store document, if embedded.
    pub embedding_ref: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl GraphNode {
    #[must_use]
    pub fn new(node_id: impl Into<String>, node_type: &str, name: &str, file: &str) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.to_string(),
            name: name.to_string(),
            file: file.to_string(),
            line: None,
            end_line: None,
            lang: None,
            signature: None,
            docstring: None,
            parent_id: None,
            embedding_ref: None,
            metadata: BTreeMap::new(),
        }
    }
}

#[must_use]
pub fn symbol_node_id(file: &str, qualified_name: &str) -> String {
    format!("symbol:{file}:{qualified_name}")
}

#[must_use]
pub fn file_node_id(file: &str) -> String {
    format!("file:{file}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub src: String,
    pub dst: String,
    pub edge_type: GraphEdgeType,
    pub weight: Option<f64>,
    pub metadata: BTreeMap<String, String>,
}

impl GraphEdge {
    #[must_use]
    pub fn new(src: impl Into<String>, dst: impl Into<String>, edge_type: GraphEdgeType) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            edge_type,
            weight: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Conjunctive node filter; `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    pub name: Option<String>,
    pub node_type: Option<String>,
    pub file: Option<String>,
}

impl NodeQuery {
    fn matches(&self, node: &GraphNode) -> bool {
        self.name.as_ref().is_none_or(|n| *n == node.name)
            && self.node_type.as_ref().is_none_or(|t| *t == node.node_type)
            && self.file.as_ref().is_none_or(|f| *f == node.file)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub files: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

/// Storage contract shared by every graph backend.
pub trait GraphStore: Send + Sync {
    /// Insert or replace nodes by id.
    fn upsert_nodes(&self, nodes: Vec<GraphNode>) -> BoxFuture<'_, Result<()>>;

    /// Insert or replace edges by `(src, dst, edge_type)`.
    fn upsert_edges(&self, edges: Vec<GraphEdge>) -> BoxFuture<'_, Result<()>>;

    /// Outgoing edges reachable from `node_id` within `depth` hops, breadth first.
    ///
    /// `edge_types` restricts which edges are followed. A depth of 0 is treated as 1.
    fn get_neighbors(
        &self,
        node_id: &str,
        edge_types: Option<Vec<GraphEdgeType>>,
        depth: usize,
    ) -> BoxFuture<'_, Result<Vec<GraphEdge>>>;

    fn find_nodes(&self, query: NodeQuery) -> BoxFuture<'_, Result<Vec<GraphNode>>>;

    /// Case-insensitive search over name, signature and docstring.
    ///
    /// Ranked exact name, then name prefix, then name substring, then
    /// signature or docstring substring.
    fn search_symbols(
        &self,
        query: &str,
        limit: usize,
        node_types: Option<Vec<String>>,
    ) -> BoxFuture<'_, Result<Vec<GraphNode>>>;

    fn get_node_by_id(&self, node_id: &str) -> BoxFuture<'_, Result<Option<GraphNode>>>;

    fn get_nodes_by_file(&self, file: &str) -> BoxFuture<'_, Result<Vec<GraphNode>>>;

    fn update_file_mtime(&self, file: &str, mtime: f64) -> BoxFuture<'_, Result<()>>;

    /// Files in `file_mtimes` that were never recorded or have a newer mtime.
    fn get_stale_files(&self, file_mtimes: HashMap<String, f64>) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Files with a recorded mtime.
    fn indexed_files(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Remove the file's nodes, every edge touching them, and its mtime row.
    ///
    /// Returns the number of nodes removed.
    fn delete_by_file(&self, file: &str) -> BoxFuture<'_, Result<usize>>;

    /// Edges that end at a node of `file` and start at a node outside it.
    fn get_incoming_edges(&self, file: &str) -> BoxFuture<'_, Result<Vec<GraphEdge>>>;

    /// Remove nodes of `node_types` that no edge touches.
    ///
    /// Returns the number of nodes removed.
    fn delete_unreferenced(&self, node_types: Vec<String>) -> BoxFuture<'_, Result<usize>>;

    /// Remove everything.
    fn delete_by_repo(&self) -> BoxFuture<'_, Result<()>>;

    fn stats(&self) -> BoxFuture<'_, Result<GraphStats>>;

    fn get_all_edges(&self) -> BoxFuture<'_, Result<Vec<GraphEdge>>>;
}

/// Search rank of `node` for lowercase `needle`, lower is better.
pub(crate) fn search_rank(node: &GraphNode, needle: &str) -> Option<u8> {
    let name = node.name.to_lowercase();
    if name == needle {
        Some(0)
    } else if name.starts_with(needle) {
        Some(1)
    } else if name.contains(needle) {
        Some(2)
    } else if [&node.signature, &node.docstring]
        .into_iter()
        .flatten()
        .any(|text| text.to_lowercase().contains(needle))
    {
        Some(3)
    } else {
        None
    }
}

/// Build a graph backend by name: `memory`, or `sqlite` at `path`.
///
/// # Errors
///
/// Returns an error for unknown backends or if the database cannot be opened.
pub async fn create_graph_store(backend: &str, path: Option<&str>) -> Result<Box<dyn GraphStore>> {
    match backend {
        "memory" => Ok(Box::new(MemoryGraphStore::new())),
        "sqlite" => Ok(Box::new(SqliteGraphStore::open(path.unwrap_or(":memory:")).await?)),
        other => Err(IndexError::Other(format!(
            "unknown graph store '{other}'. Available: memory, sqlite"
        ))),
    }
}

/// Conformance checks run against every backend.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;

    fn node(id: &str, kind: &str, name: &str, file: &str) -> GraphNode {
        GraphNode::new(id, kind, name, file)
    }

    pub(crate) async fn seed(store: &dyn GraphStore) {
        let mut parse = node("symbol:a.py:parse", "function", "parse", "a.py");
        parse.signature = Some("def parse(text: str) -> Tree".into());
        parse.line = Some(1);
        parse.end_line = Some(4);
        let mut tokenize = node("symbol:a.py:tokenize", "function", "tokenize", "a.py");
        tokenize.docstring = Some("Split input for the parser.".into());
        let parser = node("symbol:b.py:Parser", "class", "Parser", "b.py");
        let lex = node("symbol:b.py:lex", "function", "lex", "b.py");
        store
            .upsert_nodes(vec![parse, tokenize, parser, lex])
            .await
            .unwrap();
        store
            .upsert_edges(vec![
                GraphEdge::new("symbol:a.py:parse", "symbol:a.py:tokenize", GraphEdgeType::Calls),
                GraphEdge::new("symbol:a.py:tokenize", "symbol:b.py:lex", GraphEdgeType::Calls),
                GraphEdge::new("symbol:b.py:Parser", "symbol:a.py:parse", GraphEdgeType::Composition),
            ])
            .await
            .unwrap();
    }

    pub(crate) async fn run(store: &dyn GraphStore) {
        seed(store).await;

        let one = store.get_neighbors("symbol:a.py:parse", None, 1).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].dst, "symbol:a.py:tokenize");
        let two = store.get_neighbors("symbol:a.py:parse", None, 2).await.unwrap();
        assert_eq!(two.len(), 2);
        let none = store
            .get_neighbors("symbol:a.py:parse", Some(vec![GraphEdgeType::Inherits]), 3)
            .await
            .unwrap();
        assert!(none.is_empty());

        let classes = store
            .find_nodes(NodeQuery {
                node_type: Some("class".into()),
                ..NodeQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(classes.len(), 1);
        let in_a = store
            .find_nodes(NodeQuery {
                file: Some("a.py".into()),
                ..NodeQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(in_a.len(), 2);

        let hits = store.search_symbols("PARSE", 10, None).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["parse", "Parser", "tokenize"]);
        let only_classes = store
            .search_symbols("parse", 10, Some(vec!["class".into()]))
            .await
            .unwrap();
        assert_eq!(only_classes.len(), 1);
        assert!(store.search_symbols("nothing_here", 10, None).await.unwrap().is_empty());
        assert_eq!(store.search_symbols("parse", 1, None).await.unwrap().len(), 1);

        let parse = store.get_node_by_id("symbol:a.py:parse").await.unwrap().unwrap();
        assert_eq!(parse.end_line, Some(4));
        assert!(store.get_node_by_id("missing").await.unwrap().is_none());

        store.update_file_mtime("a.py", 10.0).await.unwrap();
        store.update_file_mtime("b.py", 10.0).await.unwrap();
        let current = HashMap::from([
            ("a.py".to_string(), 10.0),
            ("b.py".to_string(), 11.0),
            ("c.py".to_string(), 1.0),
        ]);
        let mut stale = store.get_stale_files(current).await.unwrap();
        stale.sort();
        assert_eq!(stale, vec!["b.py", "c.py"]);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.edges, 3);
        assert_eq!(stats.edges_by_type["CALLS"], 2);

        let incoming = store.get_incoming_edges("a.py").await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].src, "symbol:b.py:Parser");
        assert!(store.get_incoming_edges("c.py").await.unwrap().is_empty());

        let removed = store.delete_by_file("a.py").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_nodes_by_file("a.py").await.unwrap().is_empty());
        assert!(store.get_all_edges().await.unwrap().is_empty());
        assert_eq!(store.indexed_files().await.unwrap(), vec!["b.py"]);

        store
            .upsert_nodes(vec![
                node("module:os", "module", "os", ""),
                node("module:sys", "module", "sys", ""),
            ])
            .await
            .unwrap();
        store
            .upsert_edges(vec![GraphEdge::new("symbol:b.py:lex", "module:sys", GraphEdgeType::Imports)])
            .await
            .unwrap();
        let pruned = store
            .delete_unreferenced(vec!["module".into(), "external_type".into()])
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get_node_by_id("module:os").await.unwrap().is_none());
        assert!(store.get_node_by_id("module:sys").await.unwrap().is_some());
        // unreferenced nodes of other types stay
        assert!(store.get_node_by_id("symbol:b.py:Parser").await.unwrap().is_some());

        store.delete_by_repo().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), GraphStats::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_type_parse_round() {
        assert_eq!("calls".parse::<GraphEdgeType>().unwrap(), GraphEdgeType::Calls);
        assert!("REFERENCES".parse::<GraphEdgeType>().is_err());
        assert_eq!(GraphEdgeType::from(EdgeType::Implements), GraphEdgeType::Implements);
    }

    #[test]
    fn rank_order() {
        let mut node = GraphNode::new("x", "function", "ParseTree", "a.rs");
        assert_eq!(search_rank(&node, "parsetree"), Some(0));
        assert_eq!(search_rank(&node, "parse"), Some(1));
        assert_eq!(search_rank(&node, "tree"), Some(2));
        node.docstring = Some("Builds the AST".into());
        assert_eq!(search_rank(&node, "ast"), Some(3));
        assert_eq!(search_rank(&node, "zzz"), None);
    }

    #[tokio::test]
    async fn factory_rejects_unknown_backend() {
        let err = create_graph_store("neo4j", None).await.err().unwrap();
        assert!(err.to_string().contains("memory, sqlite"));
        assert!(create_graph_store("memory", None).await.is_ok());
    }
}
