use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use super::{
    BoxFuture, GraphEdge, GraphEdgeType, GraphNode, GraphStats, GraphStore, NodeQuery, search_rank,
};
use crate::error::{IndexError, Result};

type EdgeKey = (String, String, GraphEdgeType);

#[derive(Default)]
struct Graph {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<EdgeKey, GraphEdge>,
    mtimes: HashMap<String, f64>,
}

/// Graph held in maps and scanned linearly. Suited to tests and small repositories.
pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
}

impl MemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(Graph::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Graph>> {
        self.graph
            .read()
            .map_err(|e| IndexError::Other(format!("graph lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Graph>> {
        self.graph
            .write()
            .map_err(|e| IndexError::Other(format!("graph lock poisoned: {e}")))
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGraphStore").finish_non_exhaustive()
    }
}

impl GraphStore for MemoryGraphStore {
    fn upsert_nodes(&self, nodes: Vec<GraphNode>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut graph = self.write()?;
            for node in nodes {
                graph.nodes.insert(node.node_id.clone(), node);
            }
            Ok(())
        })
    }

    fn upsert_edges(&self, edges: Vec<GraphEdge>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut graph = self.write()?;
            for edge in edges {
                graph
                    .edges
                    .insert((edge.src.clone(), edge.dst.clone(), edge.edge_type), edge);
            }
            Ok(())
        })
    }

    fn get_neighbors(
        &self,
        node_id: &str,
        edge_types: Option<Vec<GraphEdgeType>>,
        depth: usize,
    ) -> BoxFuture<'_, Result<Vec<GraphEdge>>> {
        let start = node_id.to_owned();
        Box::pin(async move {
            let graph = self.read()?;
            let mut out = Vec::new();
            let mut visited = HashSet::from([start.clone()]);
            let mut frontier = VecDeque::from([(start, 0usize)]);
            while let Some((current, level)) = frontier.pop_front() {
                if level >= depth.max(1) {
                    continue;
                }
                let mut next: Vec<&GraphEdge> = graph
                    .edges
                    .values()
                    .filter(|e| e.src == current)
                    .filter(|e| edge_types.as_ref().is_none_or(|t| t.contains(&e.edge_type)))
                    .collect();
                next.sort_by(|a, b| (&a.dst, a.edge_type).cmp(&(&b.dst, b.edge_type)));
                for edge in next {
                    out.push(edge.clone());
                    if visited.insert(edge.dst.clone()) {
                        frontier.push_back((edge.dst.clone(), level + 1));
                    }
                }
            }
            Ok(out)
        })
    }

    fn find_nodes(&self, query: NodeQuery) -> BoxFuture<'_, Result<Vec<GraphNode>>> {
        Box::pin(async move {
            let graph = self.read()?;
            let mut nodes: Vec<GraphNode> = graph
                .nodes
                .values()
                .filter(|n| query.matches(n))
                .cloned()
                .collect();
            nodes.sort_by(|a, b| (&a.file, a.line, &a.name).cmp(&(&b.file, b.line, &b.name)));
            Ok(nodes)
        })
    }

    fn search_symbols(
        &self,
        query: &str,
        limit: usize,
        node_types: Option<Vec<String>>,
    ) -> BoxFuture<'_, Result<Vec<GraphNode>>> {
        let needle = query.to_lowercase();
        Box::pin(async move {
            let graph = self.read()?;
            let mut ranked: Vec<(u8, &GraphNode)> = graph
                .nodes
                .values()
                .filter(|n| node_types.as_ref().is_none_or(|t| t.contains(&n.node_type)))
                .filter_map(|n| search_rank(n, &needle).map(|r| (r, n)))
                .collect();
            ranked.sort_by(|a, b| (a.0, &a.1.name).cmp(&(b.0, &b.1.name)));
            Ok(ranked.into_iter().take(limit).map(|(_, n)| n.clone()).collect())
        })
    }

    fn get_node_by_id(&self, node_id: &str) -> BoxFuture<'_, Result<Option<GraphNode>>> {
        let node_id = node_id.to_owned();
        Box::pin(async move { Ok(self.read()?.nodes.get(&node_id).cloned()) })
    }

    fn get_nodes_by_file(&self, file: &str) -> BoxFuture<'_, Result<Vec<GraphNode>>> {
        self.find_nodes(NodeQuery {
            file: Some(file.to_owned()),
            ..NodeQuery::default()
        })
    }

    fn update_file_mtime(&self, file: &str, mtime: f64) -> BoxFuture<'_, Result<()>> {
        let file = file.to_owned();
        Box::pin(async move {
            self.write()?.mtimes.insert(file, mtime);
            Ok(())
        })
    }

    fn get_stale_files(&self, file_mtimes: HashMap<String, f64>) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let graph = self.read()?;
            let mut stale: Vec<String> = file_mtimes
                .into_iter()
                .filter(|(file, mtime)| graph.mtimes.get(file).is_none_or(|stored| mtime > stored))
                .map(|(file, _)| file)
                .collect();
            stale.sort();
            Ok(stale)
        })
    }

    fn indexed_files(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let mut files: Vec<String> = self.read()?.mtimes.keys().cloned().collect();
            files.sort();
            Ok(files)
        })
    }

    fn delete_by_file(&self, file: &str) -> BoxFuture<'_, Result<usize>> {
        let file = file.to_owned();
        Box::pin(async move {
            let mut graph = self.write()?;
            let ids: HashSet<String> = graph
                .nodes
                .values()
                .filter(|n| n.file == file)
                .map(|n| n.node_id.clone())
                .collect();
            graph.nodes.retain(|id, _| !ids.contains(id));
            graph
                .edges
                .retain(|(src, dst, _), _| !ids.contains(src) && !ids.contains(dst));
            graph.mtimes.remove(&file);
            Ok(ids.len())
        })
    }

    fn get_incoming_edges(&self, file: &str) -> BoxFuture<'_, Result<Vec<GraphEdge>>> {
        let file = file.to_owned();
        Box::pin(async move {
            let graph = self.read()?;
            let in_file = |id: &str| graph.nodes.get(id).is_some_and(|n| n.file == file);
            let mut edges: Vec<GraphEdge> = graph
                .edges
                .values()
                .filter(|e| in_file(&e.dst) && !in_file(&e.src))
                .cloned()
                .collect();
            edges.sort_by(|a, b| (&a.src, &a.dst, a.edge_type).cmp(&(&b.src, &b.dst, b.edge_type)));
            Ok(edges)
        })
    }

    fn delete_unreferenced(&self, node_types: Vec<String>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let mut graph = self.write()?;
            let referenced: HashSet<String> = graph
                .edges
                .keys()
                .flat_map(|(src, dst, _)| [src.clone(), dst.clone()])
                .collect();
            let before = graph.nodes.len();
            graph
                .nodes
                .retain(|id, n| !node_types.contains(&n.node_type) || referenced.contains(id));
            Ok(before - graph.nodes.len())
        })
    }

    fn delete_by_repo(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.write()? = Graph::default();
            Ok(())
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<GraphStats>> {
        Box::pin(async move {
            let graph = self.read()?;
            let mut stats = GraphStats {
                nodes: graph.nodes.len(),
                edges: graph.edges.len(),
                files: graph.mtimes.len(),
                ..GraphStats::default()
            };
            for node in graph.nodes.values() {
                *stats.nodes_by_type.entry(node.node_type.clone()).or_insert(0) += 1;
            }
            for edge in graph.edges.values() {
                *stats
                    .edges_by_type
                    .entry(edge.edge_type.as_str().to_string())
                    .or_insert(0) += 1;
            }
            Ok(stats)
        })
    }

    fn get_all_edges(&self) -> BoxFuture<'_, Result<Vec<GraphEdge>>> {
        Box::pin(async move {
            let mut edges: Vec<GraphEdge> = self.read()?.edges.values().cloned().collect();
            edges.sort_by(|a, b| (&a.src, &a.dst, a.edge_type).cmp(&(&b.src, &b.dst, b.edge_type)));
            Ok(edges)
        })
    }
}
