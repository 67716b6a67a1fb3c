//! Incremental pass that mirrors a source tree into a [`GraphStore`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::{GraphEdge, GraphEdgeType, GraphNode, GraphStore, NodeQuery, file_node_id, symbol_node_id};
use crate::error::{IndexError, Result};
use crate::extractor::{EdgeType, ExtractedEdge};
use crate::ignore_policy::{IgnorePolicy, relative_path};
use crate::languages::LanguageTier;
use crate::symbol_store::{FileError, FileErrorKind, mtime_secs};
use crate::unified::{FileExtraction, UnifiedExtractor};

const EXTERNAL_TYPE: &str = "external_type";
const MODULE: &str = "module";
const SIGNATURE_MAX_CHARS: usize = 200;

/// Outcome of one [`GraphIndexer::index`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphIndexReport {
    pub files_total: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    /// Calls and compositions whose target matched no known symbol.
    pub edges_unresolved: usize,
    /// Module and external type nodes dropped once nothing referenced them.
    pub nodes_pruned: usize,
    pub errors: Vec<FileError>,
    pub duration_ms: u64,
}

struct Pending {
    rel: String,
    mtime: f64,
    extraction: FileExtraction,
    /// Qualified name to node id, for symbols in this file.
    local: HashMap<String, String>,
    /// Bare name to node ids, for symbols in this file.
    local_by_name: HashMap<String, Vec<String>>,
}

/// Edge from an untouched file into a file about to be replaced.
struct Detached {
    edge: GraphEdge,
    /// Bare name of the node the edge pointed at.
    target: String,
}

pub struct GraphIndexer {
    store: Arc<dyn GraphStore>,
    unified: Arc<UnifiedExtractor>,
    ignore: IgnorePolicy,
    pass_lock: tokio::sync::Mutex<()>,
}

impl GraphIndexer {
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, unified: Arc<UnifiedExtractor>, ignore: IgnorePolicy) -> Self {
        Self {
            store,
            unified,
            ignore,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Bring the graph in line with `root`. `force` rebuilds every file.
    ///
    /// Stale files are replaced wholesale: their nodes and every edge touching
    /// them are removed before re-extraction. Edges from untouched files into a
    /// replaced file are set aside first and resolved again by target name once
    /// the new nodes are in, so they follow a symbol that survived the edit and
    /// fall back to an external type or drop out when it did not. Module and
    /// external type nodes left without edges are pruned at the end.
    ///
    /// Calls from untouched files that matched nothing before the pass stay
    /// unresolved until their own file changes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IndexBusy`] if a pass is already running, or a
    /// store error. Unreadable files are reported, not returned.
    pub async fn index(&self, root: &Path, force: bool) -> Result<GraphIndexReport> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| IndexError::IndexBusy(root.display().to_string()))?;
        let start = Instant::now();
        let mut report = GraphIndexReport::default();

        let registry = self.unified.extractor().registry();
        let mut files: HashMap<String, (PathBuf, String, f64)> = HashMap::new();
        for path in self.ignore.walk(root) {
            let Some(language) = registry.detect_language(&path) else {
                continue;
            };
            let mtime = std::fs::metadata(&path).map(|m| mtime_secs(&m)).unwrap_or(0.0);
            files.insert(relative_path(root, &path), (path, language.name.clone(), mtime));
        }
        report.files_total = files.len();
        tracing::info!(root = %root.display(), total = report.files_total, force, "graph indexing started");

        let mut stale: Vec<String> = if force {
            files.keys().cloned().collect()
        } else {
            let mtimes = files.iter().map(|(rel, (_, _, m))| (rel.clone(), *m)).collect();
            self.store.get_stale_files(mtimes).await?
        };
        stale.sort();
        report.files_skipped = report.files_total - stale.len();
        let mut replaced: HashSet<String> = stale.iter().cloned().collect();

        let mut detached = Vec::new();
        for rel in self.store.indexed_files().await? {
            if !files.contains_key(&rel) {
                detached.extend(self.detach(&rel).await?);
                self.store.delete_by_file(&rel).await?;
                report.files_deleted += 1;
                tracing::debug!(file = %rel, "removed vanished file from graph");
                replaced.insert(rel);
            }
        }

        let mut pending = Vec::with_capacity(stale.len());
        for rel in stale {
            let Some((path, language, mtime)) = files.get(&rel) else {
                continue;
            };
            detached.extend(self.detach(&rel).await?);
            let content = match tokio::fs::read(path).await {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        self.fail(&mut report, &rel, FileErrorKind::Encoding, e).await?;
                        continue;
                    }
                },
                Err(e) => {
                    self.fail(&mut report, &rel, FileErrorKind::Io, e).await?;
                    continue;
                }
            };

            self.store.delete_by_file(&rel).await?;
            let extraction = self.unified.extract_file(&rel, language, &content).await;
            let (nodes, edges, local, local_by_name) = file_nodes(&rel, &content, &extraction);
            report.nodes_written += nodes.len();
            report.edges_written += edges.len();
            self.store.upsert_nodes(nodes).await?;
            self.store.upsert_edges(edges).await?;
            tracing::debug!(file = %rel, symbols = extraction.symbols.len(), "graph nodes written");
            pending.push(Pending {
                rel,
                mtime: *mtime,
                extraction,
                local,
                local_by_name,
            });
        }

        let mut global: HashMap<String, Option<String>> = HashMap::new();
        for file in &pending {
            let (edges, externals, unresolved) = self.relation_edges(file, &mut global).await?;
            report.edges_unresolved += unresolved;
            report.nodes_written += externals.len();
            report.edges_written += edges.len();
            self.store.upsert_nodes(externals).await?;
            self.store.upsert_edges(edges).await?;
            self.store.update_file_mtime(&file.rel, file.mtime).await?;
            report.files_indexed += 1;
        }

        let (edges, externals, dropped) = self.reattach(detached, &replaced, &mut global).await?;
        report.edges_unresolved += dropped;
        report.nodes_written += externals.len();
        report.edges_written += edges.len();
        self.store.upsert_nodes(externals).await?;
        self.store.upsert_edges(edges).await?;
        report.nodes_pruned = self
            .store
            .delete_unreferenced(vec![MODULE.to_string(), EXTERNAL_TYPE.to_string()])
            .await?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            deleted = report.files_deleted,
            failed = report.files_failed,
            nodes = report.nodes_written,
            edges = report.edges_written,
            unresolved = report.edges_unresolved,
            pruned = report.nodes_pruned,
            duration_ms = report.duration_ms,
            "graph indexing complete"
        );
        Ok(report)
    }

    async fn fail(
        &self,
        report: &mut GraphIndexReport,
        rel: &str,
        kind: FileErrorKind,
        err: impl ToString,
    ) -> Result<()> {
        // stale graph rows for an unreadable file would otherwise linger
        self.store.delete_by_file(rel).await?;
        report.files_failed += 1;
        let err = FileError::new(rel, kind, err);
        tracing::warn!(file = %rel, kind = %err.kind, "graph indexing skipped file: {}", err.message);
        report.errors.push(err);
        Ok(())
    }

    /// Incoming edges from other files into `rel`, with the names they point at.
    async fn detach(&self, rel: &str) -> Result<Vec<Detached>> {
        let incoming = self.store.get_incoming_edges(rel).await?;
        if incoming.is_empty() {
            return Ok(Vec::new());
        }
        let names: HashMap<String, String> = self
            .store
            .get_nodes_by_file(rel)
            .await?
            .into_iter()
            .map(|n| (n.node_id, n.name))
            .collect();
        Ok(incoming
            .into_iter()
            .filter_map(|edge| {
                let target = names.get(&edge.dst)?.clone();
                Some(Detached { edge, target })
            })
            .collect())
    }

    /// Point detached edges at the current node for their target name.
    ///
    /// Edges whose source file was itself replaced are skipped; that file's
    /// fresh extraction already produced them.
    async fn reattach(
        &self,
        detached: Vec<Detached>,
        replaced: &HashSet<String>,
        global: &mut HashMap<String, Option<String>>,
    ) -> Result<(Vec<GraphEdge>, Vec<GraphNode>, usize)> {
        let mut edges = Vec::new();
        let mut externals = Vec::new();
        let mut dropped = 0;
        for Detached { mut edge, target } in detached {
            let Some(src) = self.store.get_node_by_id(&edge.src).await? else {
                continue;
            };
            if replaced.contains(&src.file) {
                continue;
            }
            edge.dst = match (self.resolve_global(&target, global).await?, edge.edge_type) {
                (Some(id), _) => id,
                (None, GraphEdgeType::Inherits | GraphEdgeType::Implements) => {
                    let id = format!("{EXTERNAL_TYPE}:{target}");
                    externals.push(GraphNode::new(id.clone(), EXTERNAL_TYPE, &target, ""));
                    id
                }
                (None, _) => {
                    tracing::debug!(src = %edge.src, target = %target, "dropped edge to vanished symbol");
                    dropped += 1;
                    continue;
                }
            };
            edges.push(edge);
        }
        Ok((edges, externals, dropped))
    }

    /// Relationship edges for one file, plus any external type nodes they need.
    async fn relation_edges(
        &self,
        file: &Pending,
        global: &mut HashMap<String, Option<String>>,
    ) -> Result<(Vec<GraphEdge>, Vec<GraphNode>, usize)> {
        let mut edges = Vec::new();
        let mut externals = Vec::new();
        let mut unresolved = 0;
        for edge in &file.extraction.edges {
            let src = file
                .local
                .get(&edge.source)
                .or_else(|| unique(file.local_by_name.get(bare(&edge.source))))
                .cloned()
                .unwrap_or_else(|| file_node_id(&file.rel));

            let target = bare(&edge.target);
            let dst = match unique(file.local_by_name.get(target)) {
                Some(id) => Some(id.clone()),
                None => self.resolve_global(target, global).await?,
            };
            let dst = match (dst, edge.edge_type) {
                (Some(id), _) => id,
                (None, EdgeType::Inherits | EdgeType::Implements) => {
                    let id = format!("{EXTERNAL_TYPE}:{target}");
                    externals.push(GraphNode::new(id.clone(), EXTERNAL_TYPE, target, ""));
                    id
                }
                (None, EdgeType::Calls | EdgeType::Composition) => {
                    unresolved += 1;
                    continue;
                }
            };
            edges.push(relation(edge, src, dst));
        }
        Ok((edges, externals, unresolved))
    }

    /// Node id of the only symbol named `name` anywhere in the graph.
    async fn resolve_global(
        &self,
        name: &str,
        cache: &mut HashMap<String, Option<String>>,
    ) -> Result<Option<String>> {
        if let Some(hit) = cache.get(name) {
            return Ok(hit.clone());
        }
        let matches: Vec<GraphNode> = self
            .store
            .find_nodes(NodeQuery {
                name: Some(name.to_string()),
                ..NodeQuery::default()
            })
            .await?
            .into_iter()
            .filter(|n| n.node_id.starts_with("symbol:"))
            .collect();
        let hit = match matches.as_slice() {
            [only] => Some(only.node_id.clone()),
            _ => None,
        };
        cache.insert(name.to_string(), hit.clone());
        Ok(hit)
    }
}

impl std::fmt::Debug for GraphIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphIndexer")
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}

/// Last segment of a dotted or `::`-separated path.
fn bare(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name)
}

fn unique(ids: Option<&Vec<String>>) -> Option<&String> {
    match ids.map(Vec::as_slice) {
        Some([only]) => Some(only),
        _ => None,
    }
}

fn relation(edge: &ExtractedEdge, src: String, dst: String) -> GraphEdge {
    let mut out = GraphEdge::new(src, dst, GraphEdgeType::from(edge.edge_type));
    out.metadata.insert("file".into(), edge.file.clone());
    out.metadata.insert("line".into(), edge.line.to_string());
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

type FileNodes = (
    Vec<GraphNode>,
    Vec<GraphEdge>,
    HashMap<String, String>,
    HashMap<String, Vec<String>>,
);

/// File node, symbol nodes, `CONTAINS` and `IMPORTS` edges for one file.
fn file_nodes(rel: &str, content: &str, extraction: &FileExtraction) -> FileNodes {
    let file_id = file_node_id(rel);
    let file_name = rel.rsplit('/').next().unwrap_or(rel);
    let mut file_node = GraphNode::new(file_id.clone(), "file", file_name, rel);
    file_node.lang = Some(extraction.language.clone());
    file_node
        .metadata
        .insert("tier".into(), extraction.tier.tier.to_string());
    if let Some(line) = extraction.syntax_error {
        file_node.metadata.insert("syntax_error_line".into(), line.to_string());
    }

    let lines: Vec<&str> = content.lines().collect();
    let mut local = HashMap::new();
    let mut local_by_name: HashMap<String, Vec<String>> = HashMap::new();
    for symbol in &extraction.symbols {
        let id = symbol_node_id(rel, &symbol.qualified_name());
        local.insert(symbol.qualified_name(), id.clone());
        local_by_name.entry(symbol.name.clone()).or_default().push(id);
    }

    let mut nodes = vec![file_node];
    let mut edges = Vec::new();
    for symbol in &extraction.symbols {
        let id = symbol_node_id(rel, &symbol.qualified_name());
        let parent_id = symbol
            .parent_symbol
            .as_ref()
            .and_then(|p| local.get(p))
            .cloned()
            .unwrap_or_else(|| file_id.clone());

        let mut node = GraphNode::new(id.clone(), &symbol.symbol_type, &symbol.name, rel);
        node.line = i64::try_from(symbol.line_number).ok();
        node.end_line = i64::try_from(symbol.end_line).ok();
        node.lang = Some(extraction.language.clone());
        node.docstring.clone_from(&symbol.docstring);
        node.signature = symbol.signature.clone().or_else(|| {
            (symbol.source_tier == LanguageTier::Tier3)
                .then(|| lines.get(symbol.line_number.saturating_sub(1)))
                .flatten()
                .map(|l| truncate_chars(l.trim(), SIGNATURE_MAX_CHARS))
        });
        node.parent_id = Some(parent_id.clone());
        if let Some(ret) = &symbol.return_type {
            node.metadata.insert("return_type".into(), ret.clone());
        }
        if let Some(vis) = &symbol.visibility {
            node.metadata.insert("visibility".into(), vis.clone());
        }
        if symbol.is_async {
            node.metadata.insert("is_async".into(), "true".into());
        }
        if !symbol.parameters.is_empty() {
            node.metadata.insert("parameters".into(), symbol.parameters.join(", "));
        }
        if !symbol.decorators.is_empty() {
            node.metadata.insert("decorators".into(), symbol.decorators.join(", "));
        }
        nodes.push(node);
        edges.push(GraphEdge::new(parent_id, id, GraphEdgeType::Contains));
    }

    let mut modules = HashSet::new();
    for import in &extraction.imports {
        if !modules.insert(import.name.as_str()) {
            continue;
        }
        let module_id = format!("{MODULE}:{}", import.name);
        nodes.push(GraphNode::new(module_id.clone(), MODULE, &import.name, ""));
        let mut edge = GraphEdge::new(file_id.clone(), module_id, GraphEdgeType::Imports);
        edge.metadata.insert("line".into(), import.line.to_string());
        edges.push(edge);
    }

    (nodes, edges, local, local_by_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::TreeSitterExtractor;
    use crate::graph::MemoryGraphStore;
    use crate::languages::LanguageRegistry;

    fn indexer() -> GraphIndexer {
        let registry = Arc::new(LanguageRegistry::with_builtins());
        let unified = UnifiedExtractor::new(Arc::new(TreeSitterExtractor::new(registry)));
        GraphIndexer::new(
            Arc::new(MemoryGraphStore::new()),
            Arc::new(unified),
            IgnorePolicy::new(),
        )
    }

    #[test]
    fn bare_names() {
        assert_eq!(bare("self.helper"), "helper");
        assert_eq!(bare("std::io::Read"), "Read");
        assert_eq!(bare("plain"), "plain");
    }

    #[tokio::test]
    async fn unreadable_encoding_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        let report = indexer().index(dir.path(), false).await.unwrap();
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.errors[0].kind, FileErrorKind::Encoding);
        assert_eq!(report.files_indexed, 0);
    }

    #[cfg(feature = "lang-python")]
    mod python {
        use super::*;

        const BASE: &str = "class Animal:\n    def speak(self):\n        return helper()\n\n\ndef helper():\n    return 1\n";
        const DOG: &str = "import os\nfrom base import Animal\n\n\nclass Dog(Animal):\n    def bark(self):\n        return helper()\n\n\nclass Cat(Pet):\n    pass\n";

        fn write_repo() -> tempfile::TempDir {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("base.py"), BASE).unwrap();
            std::fs::write(dir.path().join("dog.py"), DOG).unwrap();
            dir
        }

        /// Replace `file` and push its mtime past the last pass.
        fn rewrite(dir: &Path, file: &str, content: &str) {
            let path = dir.join(file);
            std::fs::write(&path, content).unwrap();
            let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(later)
                .unwrap();
        }

        async fn snapshot(store: &Arc<dyn GraphStore>) -> (Vec<GraphNode>, Vec<GraphEdge>) {
            let mut nodes = store.find_nodes(NodeQuery::default()).await.unwrap();
            nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
            (nodes, store.get_all_edges().await.unwrap())
        }

        async fn rebuilt(dir: &Path) -> (Vec<GraphNode>, Vec<GraphEdge>) {
            let fresh = indexer();
            fresh.index(dir, true).await.unwrap();
            snapshot(fresh.store()).await
        }

        fn has_edge(edges: &[GraphEdge], src: &str, dst: &str, t: GraphEdgeType) -> bool {
            edges.iter().any(|e| e.src == src && e.dst == dst && e.edge_type == t)
        }

        #[tokio::test]
        async fn builds_nodes_and_edges() {
            let dir = write_repo();
            let indexer = indexer();
            let report = indexer.index(dir.path(), false).await.unwrap();
            assert_eq!(report.files_indexed, 2);
            assert!(report.errors.is_empty());

            let store = indexer.store();
            let speak = store
                .get_node_by_id("symbol:base.py:Animal.speak")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(speak.node_type, "method");
            assert_eq!(speak.parent_id.as_deref(), Some("symbol:base.py:Animal"));
            assert_eq!(speak.line, Some(2));

            let edges = store.get_all_edges().await.unwrap();
            let has = |src: &str, dst: &str, t: GraphEdgeType| {
                edges.iter().any(|e| e.src == src && e.dst == dst && e.edge_type == t)
            };
            assert!(has("file:base.py", "symbol:base.py:Animal", GraphEdgeType::Contains));
            assert!(has("symbol:base.py:Animal", "symbol:base.py:Animal.speak", GraphEdgeType::Contains));
            assert!(has("symbol:base.py:Animal.speak", "symbol:base.py:helper", GraphEdgeType::Calls));
            // resolved across files through the unique global name
            assert!(has("symbol:dog.py:Dog.bark", "symbol:base.py:helper", GraphEdgeType::Calls));
            assert!(has("symbol:dog.py:Dog", "symbol:base.py:Animal", GraphEdgeType::Inherits));
            assert!(has("symbol:dog.py:Cat", "external_type:Pet", GraphEdgeType::Inherits));
            assert!(has("file:dog.py", "module:os", GraphEdgeType::Imports));

            let pet = store.get_node_by_id("external_type:Pet").await.unwrap().unwrap();
            assert_eq!(pet.node_type, "external_type");
        }

        #[tokio::test]
        async fn second_pass_skips_unchanged() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();
            let before = indexer.store().stats().await.unwrap();

            let again = indexer.index(dir.path(), false).await.unwrap();
            assert_eq!(again.files_indexed, 0);
            assert_eq!(again.files_skipped, 2);
            assert_eq!(indexer.store().stats().await.unwrap(), before);
        }

        #[tokio::test]
        async fn vanished_file_is_removed() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();
            std::fs::remove_file(dir.path().join("dog.py")).unwrap();

            let report = indexer.index(dir.path(), false).await.unwrap();
            assert_eq!(report.files_deleted, 1);
            assert!(indexer.store().get_nodes_by_file("dog.py").await.unwrap().is_empty());
            assert_eq!(indexer.store().indexed_files().await.unwrap(), vec!["base.py"]);
        }

        #[tokio::test]
        async fn force_reindexes_everything() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();
            let report = indexer.index(dir.path(), true).await.unwrap();
            assert_eq!(report.files_indexed, 2);
            assert_eq!(report.files_skipped, 0);
        }

        #[tokio::test]
        async fn editing_a_base_keeps_incoming_edges() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();

            rewrite(dir.path(), "base.py", &format!("{BASE}# trailing note\n"));
            let report = indexer.index(dir.path(), false).await.unwrap();
            assert_eq!(report.files_indexed, 1);
            assert_eq!(report.files_skipped, 1);

            let (nodes, edges) = snapshot(indexer.store()).await;
            assert!(has_edge(&edges, "symbol:dog.py:Dog", "symbol:base.py:Animal", GraphEdgeType::Inherits));
            assert!(has_edge(&edges, "symbol:dog.py:Dog.bark", "symbol:base.py:helper", GraphEdgeType::Calls));
            assert!(has_edge(&edges, "symbol:base.py:Animal.speak", "symbol:base.py:helper", GraphEdgeType::Calls));
            assert!(has_edge(&edges, "symbol:dog.py:Cat", "external_type:Pet", GraphEdgeType::Inherits));
            assert_eq!((nodes, edges), rebuilt(dir.path()).await);
        }

        #[tokio::test]
        async fn incremental_pass_matches_rebuild_after_target_vanishes() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();

            rewrite(dir.path(), "base.py", "class Beast:\n    def speak(self):\n        return 1\n");
            let report = indexer.index(dir.path(), false).await.unwrap();
            assert_eq!(report.files_indexed, 1);

            let (nodes, edges) = snapshot(indexer.store()).await;
            assert!(has_edge(&edges, "symbol:dog.py:Dog", "external_type:Animal", GraphEdgeType::Inherits));
            assert!(!edges.iter().any(|e| e.dst.contains("helper")));
            assert_eq!((nodes, edges), rebuilt(dir.path()).await);
        }

        #[tokio::test]
        async fn vanished_target_file_matches_rebuild() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();
            std::fs::remove_file(dir.path().join("base.py")).unwrap();

            indexer.index(dir.path(), false).await.unwrap();
            let (nodes, edges) = snapshot(indexer.store()).await;
            assert!(has_edge(&edges, "symbol:dog.py:Dog", "external_type:Animal", GraphEdgeType::Inherits));
            assert_eq!((nodes, edges), rebuilt(dir.path()).await);
        }

        #[tokio::test]
        async fn orphaned_modules_and_external_types_are_pruned() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();
            let store = indexer.store();
            assert!(store.get_node_by_id("module:os").await.unwrap().is_some());

            rewrite(dir.path(), "dog.py", "class Dog:\n    pass\n");
            let report = indexer.index(dir.path(), false).await.unwrap();
            assert!(report.nodes_pruned >= 2);
            assert!(store.get_node_by_id("module:os").await.unwrap().is_none());
            assert!(store.get_node_by_id("external_type:Pet").await.unwrap().is_none());
            let placeholders = store
                .find_nodes(NodeQuery {
                    file: Some(String::new()),
                    ..NodeQuery::default()
                })
                .await
                .unwrap();
            assert!(placeholders.is_empty());
        }

        #[tokio::test]
        async fn removing_the_only_importer_prunes_its_modules() {
            let dir = write_repo();
            let indexer = indexer();
            indexer.index(dir.path(), false).await.unwrap();
            std::fs::remove_file(dir.path().join("dog.py")).unwrap();

            indexer.index(dir.path(), false).await.unwrap();
            let stats = indexer.store().stats().await.unwrap();
            assert!(!stats.nodes_by_type.contains_key("module"));
            assert!(!stats.nodes_by_type.contains_key("external_type"));
        }

        #[tokio::test]
        async fn concurrent_pass_is_rejected() {
            let dir = write_repo();
            let indexer = indexer();
            let _held = indexer.pass_lock.lock().await;
            let err = indexer.index(dir.path(), false).await.unwrap_err();
            assert!(matches!(err, IndexError::IndexBusy(_)));
        }
    }

    #[cfg(feature = "lang-config")]
    #[tokio::test]
    async fn tier3_nodes_carry_signature_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "#!/bin/bash\ngreet() {\n  echo hi\n}\n").unwrap();
        let indexer = indexer();
        indexer.index(dir.path(), false).await.unwrap();
        let nodes = indexer.store().get_nodes_by_file("run.sh").await.unwrap();
        let greet = nodes.iter().find(|n| n.name == "greet").unwrap();
        assert_eq!(greet.signature.as_deref(), Some("greet() {"));
    }
}
