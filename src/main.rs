mod config;
mod workspace;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sextant_embed::SearchResult;
use sextant_index::graph::{GraphEdgeType, GraphStore, NodeQuery};
use sextant_index::languages::LanguageTier;
use sextant_index::symbol_store::SymbolStore;
use sextant_index::watcher::IndexWatcher;

use crate::config::{Config, resolve_config_path};
use crate::workspace::Workspace;

/// Number of per-file errors printed after a pass.
const MAX_REPORTED_ERRORS: usize = 10;

#[derive(Parser)]
#[command(name = "sextant", version, about = "Code intelligence index: symbols, graph and semantic search")]
struct Cli {
    /// Path to sextant.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index symbols and the code graph
    Index {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Re-index every file
        #[arg(short, long)]
        force: bool,
    },
    /// Query the symbol store
    Symbols {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Name pattern, `*` matches anything
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short = 't', long = "type")]
        symbol_type: Option<String>,
        /// Symbols defined in this repository-relative file
        #[arg(long)]
        file: Option<String>,
        /// Show detected architecture patterns
        #[arg(long)]
        patterns: bool,
        /// Show store statistics
        #[arg(long)]
        stats: bool,
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
    /// Query the code graph
    Graph {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[command(subcommand)]
        action: GraphAction,
    },
    /// Chunk and embed the repository into the vector index
    Embed {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Drop the collection before embedding
        #[arg(short, long)]
        force: bool,
    },
    /// Semantic search over embedded chunks
    Search {
        query: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Only chunks from this repository-relative file
        #[arg(long)]
        file: Option<String>,
    },
    /// List registered languages and their extraction tiers
    Languages,
    /// Index, then re-index on every change until interrupted
    Watch {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Search nodes by name, signature or docstring
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Restrict to node types, e.g. `class`
        #[arg(short = 't', long = "type")]
        node_types: Vec<String>,
    },
    /// Outgoing edges from a node
    Neighbors {
        node_id: String,
        #[arg(short, long, default_value_t = 1)]
        depth: usize,
        /// Follow only these edge types, e.g. `CALLS`
        #[arg(short, long = "edge")]
        edges: Vec<String>,
    },
    /// Nodes defined in a file
    File { file: String },
    /// Node and edge counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber(cli.verbose);

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        Commands::Index { path, force } => run_index(&path, config, force).await,
        Commands::Symbols {
            root,
            name,
            category,
            symbol_type,
            file,
            patterns,
            stats,
            limit,
        } => {
            let workspace = Workspace::open(&root, config)?;
            let store = workspace.symbol_store().await?;
            let query = SymbolQuery {
                name,
                category,
                symbol_type,
                file,
                patterns,
                stats,
                limit,
            };
            run_symbols(&store, query).await
        }
        Commands::Graph { root, action } => {
            let workspace = Workspace::open(&root, config)?;
            let store = workspace.graph_store().await?;
            run_graph(store.as_ref(), action).await
        }
        Commands::Embed { path, force } => {
            let workspace = Workspace::open(&path, config)?;
            let provider = workspace.embedding_provider().await?;
            workspace.embed(&provider, force).await?;
            print_json(&provider.get_stats().await?)?;
            provider.close().await?;
            Ok(())
        }
        Commands::Search {
            query,
            root,
            limit,
            file,
        } => run_search(&root, config, &query, limit, file).await,
        Commands::Languages => {
            run_languages();
            Ok(())
        }
        Commands::Watch { path } => run_watch(&path, config).await,
    }
}

fn init_subscriber(verbose: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_index(path: &Path, config: Config, force: bool) -> anyhow::Result<()> {
    let force = force || config.index.force;
    let workspace = Workspace::open(path, config)?;
    let symbols = workspace.symbol_store().await?;
    let graph = workspace.graph_indexer().await?;
    let (stats, report) = workspace.index(&symbols, &graph, force).await?;

    println!(
        "symbols: {} files indexed, {} skipped, {} deleted, {} symbols, {} patterns ({} ms)",
        stats.files_indexed,
        stats.files_skipped,
        stats.files_deleted,
        stats.symbols_found,
        stats.patterns_detected,
        stats.duration_ms
    );
    println!(
        "graph: {} files indexed, {} nodes, {} edges, {} unresolved ({} ms)",
        report.files_indexed,
        report.nodes_written,
        report.edges_written,
        report.edges_unresolved,
        report.duration_ms
    );
    for error in stats.errors.iter().take(MAX_REPORTED_ERRORS) {
        println!("  {:?} {}: {}", error.kind, error.path, error.message);
    }
    if stats.errors.len() > MAX_REPORTED_ERRORS {
        println!("  ... and {} more", stats.errors.len() - MAX_REPORTED_ERRORS);
    }
    Ok(())
}

struct SymbolQuery {
    name: Option<String>,
    category: Option<String>,
    symbol_type: Option<String>,
    file: Option<String>,
    patterns: bool,
    stats: bool,
    limit: i64,
}

async fn run_symbols(store: &SymbolStore, query: SymbolQuery) -> anyhow::Result<()> {
    if query.stats {
        return print_json(&store.get_stats().await?);
    }
    if query.patterns {
        return print_json(&store.get_detected_patterns().await?);
    }
    let symbols = if let Some(name) = &query.name {
        store.find_by_name_pattern(name, query.limit).await?
    } else if let Some(category) = &query.category {
        store.find_by_category(category, query.limit).await?
    } else if let Some(kind) = &query.symbol_type {
        store.find_by_type(kind, query.limit).await?
    } else if let Some(file) = &query.file {
        store.find_symbols_in_file(file).await?
    } else {
        store.find_key_components(query.limit).await?
    };
    for s in &symbols {
        println!(
            "{}:{}  {} {}{}",
            s.file_path,
            s.line_number,
            s.symbol_type,
            s.parent_symbol
                .as_ref()
                .map(|p| format!("{p}."))
                .unwrap_or_default(),
            s.name
        );
    }
    Ok(())
}

async fn run_graph(store: &dyn GraphStore, action: GraphAction) -> anyhow::Result<()> {
    match action {
        GraphAction::Search {
            query,
            limit,
            node_types,
        } => {
            let types = (!node_types.is_empty()).then_some(node_types);
            print_json(&store.search_symbols(&query, limit, types).await?)
        }
        GraphAction::Neighbors {
            node_id,
            depth,
            edges,
        } => {
            let edge_types = if edges.is_empty() {
                None
            } else {
                Some(
                    edges
                        .iter()
                        .map(|e| e.parse::<GraphEdgeType>())
                        .collect::<Result<Vec<_>, _>>()?,
                )
            };
            if store.get_node_by_id(&node_id).await?.is_none() {
                anyhow::bail!("no graph node with id '{node_id}'");
            }
            print_json(&store.get_neighbors(&node_id, edge_types, depth).await?)
        }
        GraphAction::File { file } => {
            let query = NodeQuery {
                file: Some(file),
                ..NodeQuery::default()
            };
            print_json(&store.find_nodes(query).await?)
        }
        GraphAction::Stats => print_json(&store.stats().await?),
    }
}

async fn run_search(
    root: &Path,
    config: Config,
    query: &str,
    limit: usize,
    file: Option<String>,
) -> anyhow::Result<()> {
    let workspace = Workspace::open(root, config)?;
    let provider = workspace.embedding_provider().await?;
    if provider.get_stats().await?.document_count == 0 {
        tracing::info!("vector index is empty, embedding repository first");
        workspace.embed(&provider, false).await?;
    }

    let filter = file.map(|f| HashMap::from([("file_path".to_string(), serde_json::Value::String(f))]));
    let mut results = provider.search_similar(query, limit, filter.as_ref()).await?;

    let graph = workspace.graph_store().await?;
    for result in &mut results {
        if result.content.is_none() {
            result.content = resolve_snippet(&workspace.root, graph.as_ref(), result).await;
        }
    }
    provider.close().await?;
    print_json(&results)
}

/// Source text for a hit from a backend that keeps no content, via the graph node's line span.
async fn resolve_snippet(root: &Path, graph: &dyn GraphStore, result: &SearchResult) -> Option<String> {
    let name = result.symbol_name.as_deref()?;
    let short = name.rsplit('.').next().unwrap_or(name);
    let query = NodeQuery {
        name: Some(short.to_string()),
        file: Some(result.file_path.clone()),
        ..NodeQuery::default()
    };
    let nodes = match graph.find_nodes(query).await {
        Ok(nodes) => nodes,
        Err(e) => {
            tracing::debug!(id = %result.id, "snippet lookup failed: {e}");
            return None;
        }
    };
    let node = nodes.first()?;
    let start = usize::try_from(node.line?).ok()?.max(1);
    let end = usize::try_from(node.end_line.unwrap_or(node.line?)).ok()?.max(start);
    let text = tokio::fs::read_to_string(root.join(&result.file_path)).await.ok()?;
    Some(
        text.lines()
            .skip(start - 1)
            .take(end - start + 1)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn run_languages() {
    let registry = sextant_index::languages::LanguageRegistry::with_builtins();
    for name in registry.list_languages() {
        let Some(lang) = registry.lookup(&name) else {
            continue;
        };
        let tier = registry.tier(&name);
        println!(
            "{:<12} {:<6} {:<8} {:<4} {}",
            lang.name,
            tier.tier.as_str(),
            if lang.has_grammar() { "parser" } else { "regex" },
            if registry.tiers().is_lsp_recommended(&name) { "lsp" } else { "" },
            lang.extensions.join(" ")
        );
    }
    let summary = registry.tiers().summary();
    let count = |tier| summary.get(&tier).copied().unwrap_or(0);
    println!(
        "\n{} tier1, {} tier2, {} tier3",
        count(LanguageTier::Tier1),
        count(LanguageTier::Tier2),
        count(LanguageTier::Tier3)
    );
}

async fn run_watch(path: &Path, config: Config) -> anyhow::Result<()> {
    let force = config.index.force;
    let workspace = Arc::new(Workspace::open(path, config)?);
    let symbols = Arc::new(workspace.symbol_store().await?);
    let graph = Arc::new(workspace.graph_indexer().await?);
    workspace.index(&symbols, &graph, force).await?;

    let on_change = {
        let workspace = Arc::clone(&workspace);
        move |paths: Vec<PathBuf>| {
            let workspace = Arc::clone(&workspace);
            let symbols = Arc::clone(&symbols);
            let graph = Arc::clone(&graph);
            async move {
                tracing::info!(changed = paths.len(), "re-indexing");
                match workspace.index(&symbols, &graph, false).await {
                    Ok((stats, report)) => tracing::info!(
                        files = stats.files_indexed,
                        symbols = stats.symbols_found,
                        nodes = report.nodes_written,
                        "re-index complete"
                    ),
                    Err(e) => tracing::warn!("re-index failed: {e:#}"),
                }
            }
        }
    };

    let _watcher = IndexWatcher::start(
        &workspace.root,
        Arc::clone(&workspace.registry),
        workspace.ignore.clone(),
        on_change,
    )
    .context("failed to start watcher")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    Ok(())
}
