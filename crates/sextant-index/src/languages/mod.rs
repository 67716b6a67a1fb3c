//! Language plugins: one data record per language, a tier table, and the
//! registry that owns both.
//!
//! Languages never get their own types. Everything that varies between them
//! (extensions, shebangs, grammar, tree-sitter queries) lives in a
//! [`LanguageConfig`] value, so adding a language means adding data.

mod catalog;
mod registry;
mod tiers;

use std::path::Path;

use serde::Serialize;

pub use registry::{Detection, LanguageRegistry};
pub use tiers::{LanguageTier, TierConfig, TierTable};

/// Constructor for a tree-sitter grammar.
pub type GrammarFn = fn() -> tree_sitter::Language;

/// A symbol query paired with the kind of symbol it yields.
///
/// The query must capture `@name`; capturing the whole definition as `@def`
/// lets the extractor report an accurate end line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPattern {
    pub symbol_type: String,
    pub query: String,
}

impl QueryPattern {
    #[must_use]
    pub fn new(symbol_type: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            symbol_type: symbol_type.into(),
            query: query.into(),
        }
    }
}

/// Relationship and reference queries declared by a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Calls,
    References,
    Inheritance,
    Implements,
    Composition,
    Imports,
}

impl QueryKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::References => "references",
            Self::Inheritance => "inheritance",
            Self::Implements => "implements",
            Self::Composition => "composition",
            Self::Imports => "imports",
        }
    }
}

/// Per-language declarative tree-sitter queries.
///
/// A missing query means the capability is absent; callers check presence
/// and never the language name.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    pub symbols: Vec<QueryPattern>,
    pub calls: Option<String>,
    pub references: Option<String>,
    pub inheritance: Option<String>,
    pub implements: Option<String>,
    pub composition: Option<String>,
    pub imports: Option<String>,
    /// `(node_kind, name_field)` pairs that open a named scope.
    pub enclosing_scopes: Vec<(String, String)>,
    /// Node kinds that open a class-like scope. Members found under one get it
    /// as their parent; any other named scope is a function or method.
    pub class_scopes: Vec<String>,
}

impl QuerySet {
    #[must_use]
    pub fn get(&self, kind: QueryKind) -> Option<&str> {
        match kind {
            QueryKind::Calls => self.calls.as_deref(),
            QueryKind::References => self.references.as_deref(),
            QueryKind::Inheritance => self.inheritance.as_deref(),
            QueryKind::Implements => self.implements.as_deref(),
            QueryKind::Composition => self.composition.as_deref(),
            QueryKind::Imports => self.imports.as_deref(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
            && self.calls.is_none()
            && self.references.is_none()
            && self.inheritance.is_none()
            && self.implements.is_none()
            && self.composition.is_none()
            && self.imports.is_none()
    }
}

/// Everything the engine knows about one language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub name: String,
    pub display_name: String,
    pub aliases: Vec<String>,
    /// Lowercase, with a leading dot.
    pub extensions: Vec<String>,
    pub filenames: Vec<String>,
    /// Interpreter tokens looked up on a `#!` first line.
    pub shebangs: Vec<String>,
    pub line_comment: Option<String>,
    pub block_comment: Option<(String, String)>,
    pub language_server: Option<String>,
    pub grammar: Option<GrammarFn>,
    pub queries: QuerySet,
    /// Line regexes with one capture group, used when structural parsing is unavailable.
    pub import_patterns: Vec<String>,
    pub config_language: bool,
}

impl LanguageConfig {
    #[must_use]
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            display_name: display_name.to_string(),
            aliases: Vec::new(),
            extensions: Vec::new(),
            filenames: Vec::new(),
            shebangs: Vec::new(),
            line_comment: None,
            block_comment: None,
            language_server: None,
            grammar: None,
            queries: QuerySet::default(),
            import_patterns: Vec::new(),
            config_language: false,
        }
    }

    #[must_use]
    pub fn with_extensions(mut self, exts: &[&str]) -> Self {
        self.extensions
            .extend(exts.iter().map(|e| normalize_extension(e)));
        self
    }

    #[must_use]
    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases
            .extend(aliases.iter().map(|a| a.to_lowercase()));
        self
    }

    #[must_use]
    pub fn with_filenames(mut self, names: &[&str]) -> Self {
        self.filenames.extend(names.iter().map(ToString::to_string));
        self
    }

    #[must_use]
    pub fn with_shebangs(mut self, shebangs: &[&str]) -> Self {
        self.shebangs.extend(shebangs.iter().map(ToString::to_string));
        self
    }

    #[must_use]
    pub fn with_line_comment(mut self, marker: &str) -> Self {
        self.line_comment = Some(marker.to_string());
        self
    }

    #[must_use]
    pub fn with_block_comment(mut self, open: &str, close: &str) -> Self {
        self.block_comment = Some((open.to_string(), close.to_string()));
        self
    }

    #[must_use]
    pub fn with_language_server(mut self, server: &str) -> Self {
        self.language_server = Some(server.to_string());
        self
    }

    #[must_use]
    pub fn with_grammar(mut self, grammar: Option<GrammarFn>) -> Self {
        self.grammar = grammar;
        self
    }

    #[must_use]
    pub fn with_queries(mut self, queries: QuerySet) -> Self {
        self.queries = queries;
        self
    }

    #[must_use]
    pub fn with_import_patterns(mut self, patterns: &[&str]) -> Self {
        self.import_patterns
            .extend(patterns.iter().map(ToString::to_string));
        self
    }

    #[must_use]
    pub fn as_config_language(mut self) -> Self {
        self.config_language = true;
        self
    }

    /// Instantiate the grammar, if one is compiled in.
    #[must_use]
    pub fn grammar(&self) -> Option<tree_sitter::Language> {
        self.grammar.map(|make| make())
    }

    #[must_use]
    pub fn has_grammar(&self) -> bool {
        self.grammar.is_some()
    }

    /// Whether `path` belongs to this language by extension, exact filename,
    /// or a shebang on its first line.
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        if let Some(ext) = path_extension(path)
            && self.extensions.contains(&ext)
        {
            return true;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && self.filenames.iter().any(|f| f == name)
        {
            return true;
        }
        if self.shebangs.is_empty() || !path.is_file() {
            return false;
        }
        read_first_line(path).is_some_and(|line| self.shebang_matches(&line))
    }

    /// Confidence in `0.0..=1.0` that `content` (optionally named `filename`)
    /// is written in this language.
    #[must_use]
    pub fn content_score(&self, content: &str, filename: Option<&str>) -> f32 {
        let mut score = 0.0_f32;
        if let Some(filename) = filename {
            let path = Path::new(filename);
            if path_extension(path).is_some_and(|ext| self.extensions.contains(&ext)) {
                score += 0.5;
            }
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| self.filenames.iter().any(|f| f == name))
            {
                score += 0.5;
            }
        }
        if content.starts_with("#!") {
            let first_line = content.lines().next().unwrap_or_default();
            if self.shebang_matches(first_line) {
                score += 0.3;
            }
        }
        score.min(1.0)
    }

    fn shebang_matches(&self, first_line: &str) -> bool {
        if !first_line.starts_with("#!") {
            return false;
        }
        let tokens: Vec<&str> = first_line[2..]
            .split(|c: char| c.is_whitespace() || c == '/')
            .filter(|t| !t.is_empty())
            .collect();
        self.shebangs.iter().any(|s| {
            tokens.iter().any(|t| {
                *t == s
                    || t.strip_prefix(s.as_str())
                        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
            })
        })
    }
}

pub(crate) fn normalize_extension(ext: &str) -> String {
    let ext = ext.to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

pub(crate) fn path_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
}

fn read_first_line(path: &Path) -> Option<String> {
    use std::io::{BufRead, BufReader};

    let file = std::fs::File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    Some(line.trim_end().to_string())
}
