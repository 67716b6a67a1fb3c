//! Query-driven symbol, relationship and reference extraction.
//!
//! The extractor never looks at a language's name to decide what to do. It
//! runs whichever queries the language declares and skips the ones it does
//! not. Parsers and compiled queries are cached for the lifetime of the
//! extractor. Parsers are pooled per language and checked out for the length
//! of one parse, so files can be extracted from many threads at once.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator, Tree};

use crate::error::Result;
use crate::languages::{LanguageConfig, LanguageRegistry, QueryKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: String,
    pub file: String,
    /// 1-based.
    pub start_line: usize,
    /// 1-based, inclusive. Never less than `start_line`.
    pub end_line: usize,
    /// Enclosing class-like symbol, if any.
    pub parent: Option<String>,
}

impl ExtractedSymbol {
    /// `Parent.name` for members, `name` otherwise.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Calls,
    Inherits,
    Implements,
    Composition,
}

impl EdgeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "CALLS",
            Self::Inherits => "INHERITS",
            Self::Implements => "IMPLEMENTS",
            Self::Composition => "COMPOSITION",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship between two named symbols, unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedEdge {
    /// Caller, child class or owning type.
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedReference {
    pub name: String,
    pub file: String,
    pub line: usize,
    /// 0-based column.
    pub column: usize,
    /// `Class.method`, `function` or `Class` containing the reference.
    pub enclosing_scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedImport {
    pub name: String,
    pub line: usize,
}

/// Everything extracted from one file in a single parse.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    pub symbols: Vec<ExtractedSymbol>,
    pub edges: Vec<ExtractedEdge>,
    pub references: Vec<ExtractedReference>,
    pub imports: Vec<ExtractedImport>,
    /// 1-based line of the first syntax error, if the tree has any.
    pub syntax_error: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum QuerySlot {
    Symbol(usize),
    Relation(QueryKind),
}

type QueryCache = HashMap<(String, QuerySlot), Option<Arc<Query>>>;

pub struct TreeSitterExtractor {
    registry: Arc<LanguageRegistry>,
    /// Idle parsers by language name.
    parsers: Mutex<HashMap<String, Vec<Parser>>>,
    queries: Mutex<QueryCache>,
}

impl TreeSitterExtractor {
    #[must_use]
    pub fn new(registry: Arc<LanguageRegistry>) -> Self {
        Self {
            registry,
            parsers: Mutex::new(HashMap::new()),
            queries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    /// Whether `language` has a grammar and at least one symbol query.
    #[must_use]
    pub fn supports(&self, language: &str) -> bool {
        self.registry
            .lookup(language)
            .is_some_and(|l| l.has_grammar() && !l.queries.symbols.is_empty())
    }

    /// Parse `source` with a pooled parser for `language`.
    ///
    /// Returns `None` when the language has no grammar or the parser gives up.
    /// Syntax errors still produce a tree.
    #[must_use]
    pub fn parse(&self, language: &str, source: &str) -> Option<Tree> {
        let lang = self.registry.lookup(language)?;
        let mut parser = self.checkout(lang)?;
        let tree = parser.parse(source, None);
        lock(&self.parsers).entry(lang.name.clone()).or_default().push(parser);
        tree
    }

    /// An idle parser for `lang`, or a new one when all are busy.
    fn checkout(&self, lang: &LanguageConfig) -> Option<Parser> {
        if let Some(parser) = lock(&self.parsers).get_mut(&lang.name).and_then(Vec::pop) {
            return Some(parser);
        }
        let grammar = lang.grammar()?;
        let mut parser = Parser::new();
        if let Err(err) = parser.set_language(&grammar) {
            tracing::warn!(language = %lang.name, "grammar rejected: {err}");
            return None;
        }
        Some(parser)
    }

    fn query(&self, lang: &LanguageConfig, slot: QuerySlot) -> Option<Arc<Query>> {
        let key = (lang.name.clone(), slot.clone());
        let mut cache = lock(&self.queries);
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }

        let (source, kind) = match &slot {
            QuerySlot::Symbol(i) => (
                lang.queries.symbols.get(*i).map(|p| p.query.as_str()),
                "symbols",
            ),
            QuerySlot::Relation(kind) => (lang.queries.get(*kind), kind.as_str()),
        };
        let compiled = match (source, lang.grammar()) {
            (Some(src), Some(grammar)) => match Query::new(&grammar, src) {
                Ok(q) => Some(Arc::new(q)),
                Err(e) => {
                    tracing::warn!(language = %lang.name, kind, "query failed to compile: {e}");
                    None
                }
            },
            _ => None,
        };
        cache.insert(key, compiled.clone());
        compiled
    }

    /// Symbols, edges, references and imports from one parse of `source`.
    ///
    /// Unknown languages, missing grammars and unparseable input all yield an
    /// empty extraction.
    #[must_use]
    pub fn extract_source(&self, file: &str, language: &str, source: &str) -> Extraction {
        let Some(lang) = self.registry.lookup(language) else {
            return Extraction::default();
        };
        let Some(tree) = self.parse(language, source) else {
            return Extraction::default();
        };
        let ctx = FileCtx {
            file,
            lang,
            source: source.as_bytes(),
            tree: &tree,
        };

        let mut edges = self.call_edges(&ctx);
        edges.extend(self.pair_edges(&ctx, QueryKind::Inheritance, "child", "base", EdgeType::Inherits));
        edges.extend(self.pair_edges(
            &ctx,
            QueryKind::Implements,
            "child",
            "interface",
            EdgeType::Implements,
        ));
        edges.extend(self.pair_edges(&ctx, QueryKind::Composition, "owner", "type", EdgeType::Composition));

        Extraction {
            symbols: self.symbols(&ctx),
            edges,
            references: self.references(&ctx),
            imports: self.imports(&ctx),
            syntax_error: first_error_line(&tree),
        }
    }

    #[must_use]
    pub fn extract_symbols(&self, file: &str, language: &str, source: &str) -> Vec<ExtractedSymbol> {
        self.extract_source(file, language, source).symbols
    }

    #[must_use]
    pub fn extract_edges(&self, file: &str, language: &str, source: &str) -> Vec<ExtractedEdge> {
        self.extract_source(file, language, source).edges
    }

    #[must_use]
    pub fn extract_references(
        &self,
        file: &str,
        language: &str,
        source: &str,
    ) -> Vec<ExtractedReference> {
        self.extract_source(file, language, source).references
    }

    /// Read `path` and return its symbols and edges.
    ///
    /// When `language` is `None` it is detected from the path.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read.
    pub fn extract_all(
        &self,
        path: &Path,
        language: Option<&str>,
    ) -> Result<(Vec<ExtractedSymbol>, Vec<ExtractedEdge>)> {
        let ex = self.extract_path(path, language)?;
        Ok((ex.symbols, ex.edges))
    }

    /// [`Self::extract_all`] plus references.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read.
    pub fn extract_all_with_references(
        &self,
        path: &Path,
        language: Option<&str>,
    ) -> Result<(Vec<ExtractedSymbol>, Vec<ExtractedEdge>, Vec<ExtractedReference>)> {
        let ex = self.extract_path(path, language)?;
        Ok((ex.symbols, ex.edges, ex.references))
    }

    fn extract_path(&self, path: &Path, language: Option<&str>) -> Result<Extraction> {
        let language = match language {
            Some(l) => l.to_string(),
            None => match self.registry.detect_language(path) {
                Some(l) => l.name.clone(),
                None => return Ok(Extraction::default()),
            },
        };
        let bytes = std::fs::read(path)?;
        let source = String::from_utf8_lossy(&bytes);
        Ok(self.extract_source(&path.to_string_lossy(), &language, &source))
    }

    fn symbols(&self, ctx: &FileCtx<'_>) -> Vec<ExtractedSymbol> {
        let mut seen: HashSet<(String, usize)> = HashSet::new();
        let mut out = Vec::new();

        for (i, pattern) in ctx.lang.queries.symbols.iter().enumerate() {
            let Some(query) = self.query(ctx.lang, QuerySlot::Symbol(i)) else {
                continue;
            };
            let name_idx = query.capture_index_for_name("name");
            let def_idx = query.capture_index_for_name("def");

            let mut cursor = QueryCursor::new();
            let mut matches = cursor.matches(&query, ctx.tree.root_node(), ctx.source);
            while let Some(m) = matches.next() {
                let Some(name_node) = m
                    .captures
                    .iter()
                    .find(|c| Some(c.index) == name_idx)
                    .map(|c| c.node)
                else {
                    continue;
                };
                let def_node = m
                    .captures
                    .iter()
                    .find(|c| Some(c.index) == def_idx)
                    .map_or(name_node, |c| c.node);

                let name = ctx.text(name_node);
                if name.is_empty() {
                    continue;
                }
                let start_line = def_node.start_position().row + 1;
                if !seen.insert((name.clone(), start_line)) {
                    continue;
                }
                let end_line = (def_node.end_position().row + 1).max(start_line);
                let parent = ctx.enclosing_class(def_node);
                let kind = if pattern.symbol_type == "function" && parent.is_some() {
                    "method".to_string()
                } else {
                    pattern.symbol_type.clone()
                };

                out.push(ExtractedSymbol {
                    name,
                    kind,
                    file: ctx.file.to_string(),
                    start_line,
                    end_line,
                    parent,
                });
            }
        }

        out.sort_by(|a, b| a.start_line.cmp(&b.start_line).then_with(|| a.name.cmp(&b.name)));
        out
    }

    fn call_edges(&self, ctx: &FileCtx<'_>) -> Vec<ExtractedEdge> {
        let Some(query) = self.query(ctx.lang, QuerySlot::Relation(QueryKind::Calls)) else {
            return Vec::new();
        };
        let Some(callee_idx) = query.capture_index_for_name("callee") else {
            return Vec::new();
        };

        let mut edges = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, ctx.tree.root_node(), ctx.source);
        while let Some(m) = matches.next() {
            for cap in m.captures.iter().filter(|c| c.index == callee_idx) {
                let callee = ctx.text(cap.node);
                if callee.is_empty() {
                    continue;
                }
                let Some(caller) = ctx.enclosing_scope(cap.node) else {
                    continue;
                };
                edges.push(ExtractedEdge {
                    source: caller,
                    target: callee,
                    edge_type: EdgeType::Calls,
                    file: ctx.file.to_string(),
                    line: cap.node.start_position().row + 1,
                });
            }
        }
        edges
    }

    /// Edges from queries that capture a source and a target in the same match.
    fn pair_edges(
        &self,
        ctx: &FileCtx<'_>,
        kind: QueryKind,
        source_capture: &str,
        target_capture: &str,
        edge_type: EdgeType,
    ) -> Vec<ExtractedEdge> {
        let Some(query) = self.query(ctx.lang, QuerySlot::Relation(kind)) else {
            return Vec::new();
        };
        let (Some(src_idx), Some(dst_idx)) = (
            query.capture_index_for_name(source_capture),
            query.capture_index_for_name(target_capture),
        ) else {
            return Vec::new();
        };

        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, ctx.tree.root_node(), ctx.source);
        while let Some(m) = matches.next() {
            let Some(src) = m.captures.iter().find(|c| c.index == src_idx) else {
                continue;
            };
            let source = ctx.text(src.node);
            let line = src.node.start_position().row + 1;
            for dst in m.captures.iter().filter(|c| c.index == dst_idx) {
                let target = ctx.text(dst.node);
                if source.is_empty() || target.is_empty() {
                    continue;
                }
                if seen.insert((source.clone(), target.clone(), line)) {
                    edges.push(ExtractedEdge {
                        source: source.clone(),
                        target,
                        edge_type,
                        file: ctx.file.to_string(),
                        line,
                    });
                }
            }
        }
        edges
    }

    fn references(&self, ctx: &FileCtx<'_>) -> Vec<ExtractedReference> {
        let Some(query) = self.query(ctx.lang, QuerySlot::Relation(QueryKind::References)) else {
            return Vec::new();
        };
        let Some(name_idx) = query.capture_index_for_name("name") else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut refs = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, ctx.tree.root_node(), ctx.source);
        while let Some(m) = matches.next() {
            for cap in m.captures.iter().filter(|c| c.index == name_idx) {
                let pos = cap.node.start_position();
                if !seen.insert((pos.row, pos.column)) {
                    continue;
                }
                let name = ctx.text(cap.node);
                if name.is_empty() {
                    continue;
                }
                refs.push(ExtractedReference {
                    name,
                    file: ctx.file.to_string(),
                    line: pos.row + 1,
                    column: pos.column,
                    enclosing_scope: ctx.enclosing_scope(cap.node),
                });
            }
        }
        refs.sort_by_key(|r| (r.line, r.column));
        refs
    }

    fn imports(&self, ctx: &FileCtx<'_>) -> Vec<ExtractedImport> {
        let Some(query) = self.query(ctx.lang, QuerySlot::Relation(QueryKind::Imports)) else {
            return Vec::new();
        };
        let Some(idx) = query.capture_index_for_name("import") else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, ctx.tree.root_node(), ctx.source);
        while let Some(m) = matches.next() {
            for cap in m.captures.iter().filter(|c| c.index == idx) {
                let name = ctx
                    .text(cap.node)
                    .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                    .to_string();
                if !name.is_empty() {
                    out.push(ExtractedImport {
                        name,
                        line: cap.node.start_position().row + 1,
                    });
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for TreeSitterExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSitterExtractor")
            .field("languages", &self.registry.list_languages().len())
            .finish_non_exhaustive()
    }
}

fn first_error_line(tree: &Tree) -> Option<usize> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        // Descend only into subtrees that contain the error.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return Some(root.start_position().row + 1);
            }
        }
    }
}

struct FileCtx<'a> {
    file: &'a str,
    lang: &'a LanguageConfig,
    source: &'a [u8],
    tree: &'a Tree,
}

impl FileCtx<'_> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    fn scope_name(&self, node: Node<'_>, field: &str) -> Option<String> {
        let name_node = node.child_by_field_name(field)?;
        let text = self.text(name_node);
        // `impl<T> Foo<T>` names the scope `Foo`
        let bare = text.split('<').next().unwrap_or_default().trim();
        (!bare.is_empty()).then(|| bare.to_string())
    }

    fn scope_field(&self, kind: &str) -> Option<&str> {
        self.lang
            .queries
            .enclosing_scopes
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, field)| field.as_str())
    }

    fn is_class_scope(&self, kind: &str) -> bool {
        self.lang.queries.class_scopes.iter().any(|k| k == kind)
    }

    /// Nearest method plus nearest class-like scope, as `Class.method`,
    /// `method` or `Class`.
    fn enclosing_scope(&self, node: Node<'_>) -> Option<String> {
        let mut method: Option<String> = None;
        let mut class: Option<String> = None;
        let mut current = node.parent();
        while let Some(n) = current {
            if let Some(field) = self.scope_field(n.kind())
                && let Some(name) = self.scope_name(n, field)
            {
                if self.is_class_scope(n.kind()) {
                    class.get_or_insert(name);
                } else {
                    method.get_or_insert(name);
                }
            }
            current = n.parent();
        }
        match (method, class) {
            (Some(m), Some(c)) => Some(format!("{c}.{m}")),
            (Some(m), None) => Some(m),
            (None, c) => c,
        }
    }

    /// Nearest class-like ancestor of a definition node.
    fn enclosing_class(&self, def: Node<'_>) -> Option<String> {
        let mut current = def.parent();
        while let Some(n) = current {
            if self.is_class_scope(n.kind()) {
                let field = self.scope_field(n.kind()).unwrap_or("name");
                if let Some(name) = self.scope_name(n, field) {
                    return Some(name);
                }
            }
            current = n.parent();
        }
        None
    }
}

/// Lock a cache, taking it back if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TreeSitterExtractor {
        TreeSitterExtractor::new(Arc::new(LanguageRegistry::with_builtins()))
    }

    #[test]
    fn unknown_language_is_empty() {
        let ex = extractor().extract_source("a.xyz", "cobol", "IDENTIFICATION DIVISION.");
        assert!(ex.symbols.is_empty());
        assert!(ex.edges.is_empty());
    }

    #[test]
    fn language_without_grammar_is_empty() {
        let ex = extractor().extract_source("A.java", "java", "class A {}");
        assert!(ex.symbols.is_empty());
    }

    #[test]
    fn qualified_name() {
        let sym = ExtractedSymbol {
            name: "bar".into(),
            kind: "method".into(),
            file: "a.py".into(),
            start_line: 2,
            end_line: 3,
            parent: Some("Foo".into()),
        };
        assert_eq!(sym.qualified_name(), "Foo.bar");
    }

    #[cfg(feature = "lang-python")]
    mod python {
        use super::*;

        const SRC: &str = r#"import os
from pkg.models import Base

class Engine:
    pass

class Car(Base):
    def __init__(self):
        self.engine = Engine()

    def drive(self):
        helper()
        self.honk()

def helper():
    return os.getcwd()
"#;

        #[test]
        fn symbols_with_parents_and_end_lines() {
            let syms = extractor().extract_symbols("car.py", "python", SRC);
            let car = syms.iter().find(|s| s.name == "Car").unwrap();
            assert_eq!(car.kind, "class");
            assert_eq!(car.start_line, 7);
            assert_eq!(car.end_line, 13);
            let drive = syms.iter().find(|s| s.name == "drive").unwrap();
            assert_eq!(drive.kind, "method");
            assert_eq!(drive.parent.as_deref(), Some("Car"));
            let helper = syms.iter().find(|s| s.name == "helper").unwrap();
            assert_eq!(helper.kind, "function");
            assert!(helper.parent.is_none());
            assert!(syms.iter().all(|s| s.end_line >= s.start_line));
        }

        #[test]
        fn call_edges_use_class_dot_method() {
            let edges = extractor().extract_edges("car.py", "python", SRC);
            assert!(edges.iter().any(|e| e.edge_type == EdgeType::Calls
                && e.source == "Car.drive"
                && e.target == "helper"));
            assert!(edges.iter().any(|e| e.edge_type == EdgeType::Calls
                && e.source == "Car.drive"
                && e.target == "honk"));
            assert!(edges.iter().any(|e| e.edge_type == EdgeType::Calls
                && e.source == "helper"
                && e.target == "getcwd"));
        }

        #[test]
        fn inheritance_and_composition() {
            let edges = extractor().extract_edges("car.py", "python", SRC);
            assert!(edges.iter().any(|e| e.edge_type == EdgeType::Inherits
                && e.source == "Car"
                && e.target == "Base"));
            assert!(edges.iter().any(|e| e.edge_type == EdgeType::Composition
                && e.source == "Car"
                && e.target == "Engine"));
        }

        #[test]
        fn imports_captured() {
            let ex = extractor().extract_source("car.py", "python", SRC);
            let names: Vec<&str> = ex.imports.iter().map(|i| i.name.as_str()).collect();
            assert!(names.contains(&"os"));
            assert!(names.contains(&"pkg.models"));
        }

        #[test]
        fn references_carry_enclosing_scope() {
            let refs = extractor().extract_references("car.py", "python", SRC);
            let honk = refs.iter().find(|r| r.name == "honk").unwrap();
            assert_eq!(honk.enclosing_scope.as_deref(), Some("Car.drive"));
            assert_eq!(honk.line, 13);
        }

        #[test]
        fn malformed_source_is_best_effort() {
            let syms = extractor().extract_symbols("bad.py", "python", "def ok():\n    pass\n\nclass (:\n");
            assert!(syms.iter().any(|s| s.name == "ok"));
        }

        #[test]
        fn syntax_error_line_reported() {
            let ex = extractor().extract_source("bad.py", "python", "def ok():\n    pass\n\nclass (:\n");
            assert!(ex.syntax_error.is_some());
            let clean = extractor().extract_source("ok.py", "python", "def ok():\n    pass\n");
            assert_eq!(clean.syntax_error, None);
        }

        #[test]
        fn extract_all_reads_file_and_detects_language() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("car.py");
            std::fs::write(&path, SRC).unwrap();
            let (syms, edges) = extractor().extract_all(&path, None).unwrap();
            assert!(syms.iter().any(|s| s.name == "Engine"));
            assert!(!edges.is_empty());
            let (_, _, refs) = extractor().extract_all_with_references(&path, None).unwrap();
            assert!(!refs.is_empty());
        }

        #[test]
        fn parser_reused_across_files() {
            let ex = extractor();
            assert!(!ex.extract_symbols("a.py", "python", "def a(): pass\n").is_empty());
            assert!(!ex.extract_symbols("b.py", "py", "def b(): pass\n").is_empty());
            let pool = ex.parsers.lock().unwrap();
            assert_eq!(pool.len(), 1);
            assert_eq!(pool["python"].len(), 1);
        }

        #[test]
        fn class_scopes_come_from_the_language() {
            let mut registry = LanguageRegistry::with_builtins();
            let mut flat = registry.get("python").unwrap().clone();
            flat.name = "flatpy".into();
            flat.aliases.clear();
            flat.extensions = vec![".flatpy".into()];
            flat.queries.class_scopes.clear();
            registry.register(flat, &[], &[]);
            let ex = TreeSitterExtractor::new(Arc::new(registry));

            let src = "class Box:\n    def open(self):\n        pass\n";
            let nested = ex.extract_symbols("a.py", "python", src);
            let open = nested.iter().find(|s| s.name == "open").unwrap();
            assert_eq!(open.parent.as_deref(), Some("Box"));

            let flat = ex.extract_symbols("a.flatpy", "flatpy", src);
            let open = flat.iter().find(|s| s.name == "open").unwrap();
            assert_eq!(open.parent, None);
        }

        #[test]
        fn parses_in_parallel_from_many_threads() {
            let ex = extractor();
            let counts: Vec<usize> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..8)
                    .map(|i| {
                        let ex = &ex;
                        s.spawn(move || {
                            let src = format!("class C{i}:\n    def m(self):\n        return {i}\n");
                            ex.extract_symbols(&format!("c{i}.py"), "python", &src).len()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert!(counts.iter().all(|&n| n >= 2));
            let pool = ex.parsers.lock().unwrap();
            assert!((1..=8).contains(&pool["python"].len()));
        }

        #[test]
        fn poisoned_pool_still_parses() {
            let ex = extractor();
            assert!(!ex.extract_symbols("a.py", "python", "def a(): pass\n").is_empty());
            std::thread::scope(|s| {
                let poisoner = s.spawn(|| {
                    let _guard = ex.parsers.lock().unwrap();
                    panic!("poison the parser pool");
                });
                assert!(poisoner.join().is_err());
            });
            assert!(ex.parsers.is_poisoned());
            let syms = ex.extract_symbols("b.py", "python", "def b(): pass\n");
            assert_eq!(syms[0].name, "b");
        }
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_impl_methods_and_trait_edges() {
        let src = r"
struct Wheel;
struct Car { wheel: Wheel }
trait Drive { fn go(&self); }
impl Drive for Car {
    fn go(&self) { spin(); }
}
fn spin() {}
";
        let ex = extractor().extract_source("car.rs", "rust", src);
        let go = ex
            .symbols
            .iter()
            .find(|s| s.name == "go" && s.parent.as_deref() == Some("Car"))
            .unwrap();
        assert_eq!(go.kind, "method");
        assert!(ex.edges.iter().any(|e| e.edge_type == EdgeType::Implements
            && e.source == "Car"
            && e.target == "Drive"));
        assert!(ex.edges.iter().any(|e| e.edge_type == EdgeType::Composition
            && e.source == "Car"
            && e.target == "Wheel"));
        assert!(ex.edges.iter().any(|e| e.edge_type == EdgeType::Calls
            && e.source == "Car.go"
            && e.target == "spin"));
    }

    #[cfg(feature = "lang-go")]
    #[test]
    fn go_struct_and_method() {
        let src = "package main\n\ntype Server struct {\n\tport int\n}\n\nfunc (s *Server) Run() {\n\tstart()\n}\n\nfunc start() {}\n";
        let syms = extractor().extract_symbols("main.go", "go", src);
        assert!(syms.iter().any(|s| s.name == "Server" && s.kind == "struct"));
        assert!(syms.iter().any(|s| s.name == "Run" && s.kind == "method"));
        assert!(syms.iter().any(|s| s.name == "start" && s.kind == "function"));
    }

    #[cfg(feature = "lang-js")]
    #[test]
    fn typescript_implements_and_extends() {
        let src = "interface Shape { area(): number }\nclass Base {}\nclass Square extends Base implements Shape {\n  area() { return compute(); }\n}\n";
        let ex = extractor().extract_source("sq.ts", "typescript", src);
        assert!(ex.symbols.iter().any(|s| s.name == "Shape" && s.kind == "interface"));
        assert!(ex.symbols.iter().any(|s| s.name == "area" && s.kind == "method"));
        assert!(ex.edges.iter().any(|e| e.edge_type == EdgeType::Inherits && e.target == "Base"));
        assert!(ex.edges.iter().any(|e| e.edge_type == EdgeType::Implements && e.target == "Shape"));
        assert!(ex.edges.iter().any(|e| e.edge_type == EdgeType::Calls && e.source == "Square.area"));
    }
}
