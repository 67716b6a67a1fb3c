use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use sqlx::SqlitePool;

use super::{
    BoxFuture, GraphEdge, GraphEdgeType, GraphNode, GraphStats, GraphStore, NodeQuery, search_rank,
};
use crate::error::{IndexError, Result};
use crate::symbol_store::connect;

const NODE_COLUMNS: &str = "node_id, node_type, name, file, line, end_line, lang, signature, \
                            docstring, parent_id, embedding_ref, metadata";

type NodeTuple = (
    String,
    String,
    String,
    String,
    Option<i64>,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

type EdgeTuple = (String, String, String, Option<f64>, String);

fn node_from_tuple(t: NodeTuple) -> GraphNode {
    GraphNode {
        node_id: t.0,
        node_type: t.1,
        name: t.2,
        file: t.3,
        line: t.4,
        end_line: t.5,
        lang: t.6,
        signature: t.7,
        docstring: t.8,
        parent_id: t.9,
        embedding_ref: t.10,
        metadata: serde_json::from_str(&t.11).unwrap_or_default(),
    }
}

fn edge_from_tuple(t: EdgeTuple) -> Option<GraphEdge> {
    let edge_type = t.2.parse::<GraphEdgeType>().ok()?;
    Some(GraphEdge {
        src: t.0,
        dst: t.1,
        edge_type,
        weight: t.3,
        metadata: serde_json::from_str(&t.4).unwrap_or_default(),
    })
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Single-repository graph persisted in `SQLite`.
///
/// Tracks a per-file mtime table so the indexing pass can skip unchanged files.
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Open (or create) the graph database at `path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &str) -> Result<Self> {
        let pool = connect(path).await?;
        sqlx::migrate!("migrations/graph").run(&pool).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn outgoing(&self, src: &str) -> Result<Vec<GraphEdge>> {
        let rows: Vec<EdgeTuple> = sqlx::query_as(
            "SELECT src, dst, edge_type, weight, metadata FROM graph_edge WHERE src = ?",
        )
        .bind(src)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(edge_from_tuple).collect())
    }
}

impl GraphStore for SqliteGraphStore {
    fn upsert_nodes(&self, nodes: Vec<GraphNode>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for node in nodes {
                let metadata = serde_json::to_string(&node.metadata)?;
                sqlx::query(
                    "INSERT INTO graph_node (node_id, node_type, name, file, line, end_line, lang, \
                     signature, docstring, parent_id, embedding_ref, metadata) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(node_id) DO UPDATE SET node_type = excluded.node_type, \
                     name = excluded.name, file = excluded.file, line = excluded.line, \
                     end_line = excluded.end_line, lang = excluded.lang, \
                     signature = excluded.signature, docstring = excluded.docstring, \
                     parent_id = excluded.parent_id, embedding_ref = excluded.embedding_ref, \
                     metadata = excluded.metadata",
                )
                .bind(&node.node_id)
                .bind(&node.node_type)
                .bind(&node.name)
                .bind(&node.file)
                .bind(node.line)
                .bind(node.end_line)
                .bind(&node.lang)
                .bind(&node.signature)
                .bind(&node.docstring)
                .bind(&node.parent_id)
                .bind(&node.embedding_ref)
                .bind(metadata)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn upsert_edges(&self, edges: Vec<GraphEdge>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for edge in edges {
                let metadata = serde_json::to_string(&edge.metadata)?;
                sqlx::query(
                    "INSERT INTO graph_edge (src, dst, edge_type, weight, metadata) \
                     VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT(src, dst, edge_type) DO UPDATE SET \
                     weight = excluded.weight, metadata = excluded.metadata",
                )
                .bind(&edge.src)
                .bind(&edge.dst)
                .bind(edge.edge_type.as_str())
                .bind(edge.weight)
                .bind(metadata)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
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
            let mut out = Vec::new();
            let mut visited = HashSet::from([start.clone()]);
            let mut frontier = VecDeque::from([(start, 0usize)]);
            while let Some((current, level)) = frontier.pop_front() {
                if level >= depth.max(1) {
                    continue;
                }
                let mut next: Vec<GraphEdge> = self
                    .outgoing(&current)
                    .await?
                    .into_iter()
                    .filter(|e| edge_types.as_ref().is_none_or(|t| t.contains(&e.edge_type)))
                    .collect();
                next.sort_by(|a, b| (&a.dst, a.edge_type).cmp(&(&b.dst, b.edge_type)));
                for edge in next {
                    if visited.insert(edge.dst.clone()) {
                        frontier.push_back((edge.dst.clone(), level + 1));
                    }
                    out.push(edge);
                }
            }
            Ok(out)
        })
    }

    fn find_nodes(&self, query: NodeQuery) -> BoxFuture<'_, Result<Vec<GraphNode>>> {
        Box::pin(async move {
            let mut filters = Vec::new();
            let mut binds = Vec::new();
            for (column, value) in [("name", query.name), ("node_type", query.node_type), ("file", query.file)] {
                if let Some(value) = value {
                    filters.push(format!("{column} = ?"));
                    binds.push(value);
                }
            }
            let filter = if filters.is_empty() {
                "1 = 1".to_string()
            } else {
                filters.join(" AND ")
            };
            let sql = format!("SELECT {NODE_COLUMNS} FROM graph_node WHERE {filter} ORDER BY file, line, name");
            let mut q = sqlx::query_as::<_, NodeTuple>(&sql);
            for value in &binds {
                q = q.bind(value);
            }
            let rows = q.fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(node_from_tuple).collect())
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
            let sql = format!(
                "SELECT {NODE_COLUMNS} FROM graph_node WHERE name LIKE ?1 ESCAPE '\\' \
                 OR signature LIKE ?1 ESCAPE '\\' OR docstring LIKE ?1 ESCAPE '\\'"
            );
            let rows: Vec<NodeTuple> = sqlx::query_as(&sql)
                .bind(like_pattern(&needle))
                .fetch_all(&self.pool)
                .await?;
            let mut ranked: Vec<(u8, GraphNode)> = rows
                .into_iter()
                .map(node_from_tuple)
                .filter(|n| node_types.as_ref().is_none_or(|t| t.contains(&n.node_type)))
                .filter_map(|n| search_rank(&n, &needle).map(|r| (r, n)))
                .collect();
            ranked.sort_by(|a, b| (a.0, &a.1.name).cmp(&(b.0, &b.1.name)));
            Ok(ranked.into_iter().take(limit).map(|(_, n)| n).collect())
        })
    }

    fn get_node_by_id(&self, node_id: &str) -> BoxFuture<'_, Result<Option<GraphNode>>> {
        let node_id = node_id.to_owned();
        Box::pin(async move {
            let sql = format!("SELECT {NODE_COLUMNS} FROM graph_node WHERE node_id = ?");
            let row: Option<NodeTuple> = sqlx::query_as(&sql)
                .bind(node_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(node_from_tuple))
        })
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
            sqlx::query(
                "INSERT INTO graph_file_mtime (file, mtime, indexed_at) VALUES (?, ?, unixepoch()) \
                 ON CONFLICT(file) DO UPDATE SET mtime = excluded.mtime, indexed_at = excluded.indexed_at",
            )
            .bind(file)
            .bind(mtime)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn get_stale_files(&self, file_mtimes: HashMap<String, f64>) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let rows: Vec<(String, f64)> = sqlx::query_as("SELECT file, mtime FROM graph_file_mtime")
                .fetch_all(&self.pool)
                .await?;
            let stored: HashMap<String, f64> = rows.into_iter().collect();
            let mut stale: Vec<String> = file_mtimes
                .into_iter()
                .filter(|(file, mtime)| stored.get(file).is_none_or(|s| mtime > s))
                .map(|(file, _)| file)
                .collect();
            stale.sort();
            Ok(stale)
        })
    }

    fn indexed_files(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let files: Vec<String> = sqlx::query_scalar("SELECT file FROM graph_file_mtime ORDER BY file")
                .fetch_all(&self.pool)
                .await?;
            Ok(files)
        })
    }

    fn delete_by_file(&self, file: &str) -> BoxFuture<'_, Result<usize>> {
        let file = file.to_owned();
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "DELETE FROM graph_edge WHERE src IN (SELECT node_id FROM graph_node WHERE file = ?1) \
                 OR dst IN (SELECT node_id FROM graph_node WHERE file = ?1)",
            )
            .bind(&file)
            .execute(&mut *tx)
            .await?;
            let removed = sqlx::query("DELETE FROM graph_node WHERE file = ?")
                .bind(&file)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM graph_file_mtime WHERE file = ?")
                .bind(&file)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(usize::try_from(removed)?)
        })
    }

    fn get_incoming_edges(&self, file: &str) -> BoxFuture<'_, Result<Vec<GraphEdge>>> {
        let file = file.to_owned();
        Box::pin(async move {
            let rows: Vec<EdgeTuple> = sqlx::query_as(
                "SELECT e.src, e.dst, e.edge_type, e.weight, e.metadata FROM graph_edge e \
                 JOIN graph_node d ON d.node_id = e.dst \
                 LEFT JOIN graph_node s ON s.node_id = e.src \
                 WHERE d.file = ?1 AND (s.file IS NULL OR s.file != ?1) \
                 ORDER BY e.src, e.dst, e.edge_type",
            )
            .bind(file)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().filter_map(edge_from_tuple).collect())
        })
    }

    fn delete_unreferenced(&self, node_types: Vec<String>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut removed = 0;
            for node_type in node_types {
                removed += sqlx::query(
                    "DELETE FROM graph_node WHERE node_type = ? \
                     AND NOT EXISTS (SELECT 1 FROM graph_edge WHERE src = graph_node.node_id) \
                     AND NOT EXISTS (SELECT 1 FROM graph_edge WHERE dst = graph_node.node_id)",
                )
                .bind(node_type)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }
            tx.commit().await?;
            Ok(usize::try_from(removed)?)
        })
    }

    fn delete_by_repo(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for table in ["graph_edge", "graph_node", "graph_file_mtime"] {
                sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<GraphStats>> {
        Box::pin(async move {
            let nodes: Vec<(String, i64)> =
                sqlx::query_as("SELECT node_type, COUNT(*) FROM graph_node GROUP BY node_type")
                    .fetch_all(&self.pool)
                    .await?;
            let edges: Vec<(String, i64)> =
                sqlx::query_as("SELECT edge_type, COUNT(*) FROM graph_edge GROUP BY edge_type")
                    .fetch_all(&self.pool)
                    .await?;
            let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_file_mtime")
                .fetch_one(&self.pool)
                .await?;

            let to_map = |rows: Vec<(String, i64)>| -> Result<BTreeMap<String, usize>> {
                rows.into_iter()
                    .map(|(k, v)| Ok::<_, IndexError>((k, usize::try_from(v)?)))
                    .collect()
            };
            let nodes_by_type = to_map(nodes)?;
            let edges_by_type = to_map(edges)?;
            Ok(GraphStats {
                nodes: nodes_by_type.values().sum(),
                edges: edges_by_type.values().sum(),
                files: usize::try_from(files)?,
                nodes_by_type,
                edges_by_type,
            })
        })
    }

    fn get_all_edges(&self) -> BoxFuture<'_, Result<Vec<GraphEdge>>> {
        Box::pin(async move {
            let rows: Vec<EdgeTuple> = sqlx::query_as(
                "SELECT src, dst, edge_type, weight, metadata FROM graph_edge ORDER BY src, dst, edge_type",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().filter_map(edge_from_tuple).collect())
        })
    }
}
