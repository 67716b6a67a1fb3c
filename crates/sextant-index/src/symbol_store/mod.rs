//! Incremental, queryable symbol index backed by `SQLite`.
//!
//! A pass walks the repository with the shared [`IgnorePolicy`], purges
//! files that vanished, re-extracts files whose modification time moved and
//! whose content hash changed, and finally recomputes the architecture
//! pattern rows. One bad file never aborts a pass.

pub mod fallback;
pub mod patterns;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{IndexError, Result};
use crate::extractor::{ExtractedImport, ExtractedSymbol, TreeSitterExtractor};
use crate::ignore_policy::{IgnorePolicy, relative_path};

pub use patterns::{categorize_symbol, is_inheritance_anchor};

/// Extensions whose files are recorded with `file_type = config`.
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "ini", "xml", "env", "cfg", "conf"];

/// Failed-file entries printed in the pass summary before eliding.
const ERROR_SUMMARY_LIMIT: usize = 10;

const MAX_DOC_CHARS: usize = 200;

const SYMBOL_COLUMNS: &str = "name, symbol_type, file_path, line_number, language, category, \
                              docstring, signature, parent_symbol, modifiers, is_exported, content_hash";

const DOC_MARKERS: &[&str] = &["///", "//!", "/**", "/*", "//", "#", "\"\"\"", "'''", "--"];

const MODIFIER_KEYWORDS: &[(&str, &str)] = &[
    ("export", "export"),
    ("pub", "public"),
    ("public", "public"),
    ("private", "private"),
    ("protected", "protected"),
    ("async", "async"),
    ("static", "static"),
    ("abstract", "abstract"),
];

#[derive(Debug, Clone, Copy)]
enum Visibility {
    /// Exported unless the name starts with `_`.
    Underscore,
    /// Exported when the name starts with an uppercase letter.
    Capitalised,
    /// Exported when the definition line carries a visibility keyword.
    Keyword,
}

const VISIBILITY_RULES: &[(&str, Visibility)] = &[
    ("python", Visibility::Underscore),
    ("go", Visibility::Capitalised),
    ("rust", Visibility::Keyword),
    ("javascript", Visibility::Keyword),
    ("typescript", Visibility::Keyword),
    ("tsx", Visibility::Keyword),
    ("java", Visibility::Keyword),
    ("csharp", Visibility::Keyword),
    ("php", Visibility::Keyword),
    ("scala", Visibility::Keyword),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInfo {
    pub name: String,
    pub symbol_type: String,
    pub file_path: String,
    pub line_number: i64,
    pub language: String,
    pub category: Option<String>,
    pub docstring: Option<String>,
    pub signature: Option<String>,
    pub parent_symbol: Option<String>,
    pub modifiers: Vec<String>,
    pub is_exported: bool,
    pub content_hash: Option<String>,
}

type SymbolTuple = (
    String,
    String,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    Option<String>,
);

fn symbol_from_tuple(t: SymbolTuple) -> SymbolInfo {
    SymbolInfo {
        name: t.0,
        symbol_type: t.1,
        file_path: t.2,
        line_number: t.3,
        language: t.4,
        category: t.5,
        docstring: t.6,
        signature: t.7,
        parent_symbol: t.8,
        modifiers: t
            .9
            .map(|m| m.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default(),
        is_exported: t.10 != 0,
        content_hash: t.11,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Source,
    Config,
}

impl FileType {
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        let is_config = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| CONFIG_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_config { Self::Config } else { Self::Source }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Config => "config",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub language: String,
    pub size: i64,
    pub lines: i64,
    /// Seconds since the Unix epoch.
    pub last_modified: f64,
    pub indexed_at: f64,
    pub content_hash: String,
    pub symbol_count: i64,
    pub import_count: i64,
    pub file_type: FileType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternInfo {
    pub pattern_name: String,
    pub pattern_type: String,
    pub file_path: Option<String>,
    pub symbol_name: Option<String>,
    pub line_number: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    /// Structural parse failed; the file was still indexed.
    ParseError,
    /// Content is not valid UTF-8.
    Encoding,
    Io,
    Database,
}

impl std::fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ParseError => "parse_error",
            Self::Encoding => "encoding",
            Self::Io => "io",
            Self::Database => "database",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileError {
    pub path: String,
    pub kind: FileErrorKind,
    pub message: String,
}

impl FileError {
    pub(crate) fn new(path: &str, kind: FileErrorKind, message: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            kind,
            message: message.to_string(),
        }
    }
}

/// Outcome of one [`SymbolStore::index`] pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    /// Indexed with a degraded (partially regex) extraction.
    pub files_with_errors: usize,
    /// Not indexed at all.
    pub files_failed: usize,
    pub symbols_found: usize,
    pub patterns_detected: usize,
    pub languages: BTreeMap<String, usize>,
    pub errors: Vec<FileError>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_files: i64,
    pub total_symbols: i64,
    pub total_imports: i64,
    pub total_patterns: i64,
    pub source_files: i64,
    pub config_files: i64,
    pub by_language: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
    pub last_indexed: Option<f64>,
}

enum FileOutcome {
    Skipped,
    Indexed {
        symbols: usize,
        parse_error: Option<String>,
    },
}

struct Extracted {
    symbols: Vec<SymbolInfo>,
    imports: Vec<ExtractedImport>,
    parse_error: Option<String>,
}

pub struct SymbolStore {
    pool: SqlitePool,
    root: PathBuf,
    extractor: Arc<TreeSitterExtractor>,
    ignore: IgnorePolicy,
    pass_lock: tokio::sync::Mutex<()>,
}

impl SymbolStore {
    /// Open (or create) the symbol database for the repository at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(
        db_path: &str,
        root: &Path,
        extractor: Arc<TreeSitterExtractor>,
        ignore: IgnorePolicy,
    ) -> Result<Self> {
        let pool = connect(db_path).await?;
        sqlx::migrate!("migrations/symbols").run(&pool).await?;
        Ok(Self {
            pool,
            root: root.to_path_buf(),
            extractor,
            ignore,
            pass_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run one incremental pass. `force` re-extracts every file.
    ///
    /// Per-file failures land in [`IndexStats::errors`]; only database
    /// failures outside a single file's transaction are returned as `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IndexBusy`] if another pass is running on this
    /// store, or a database error.
    pub async fn index(&self, force: bool) -> Result<IndexStats> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| IndexError::IndexBusy(self.root.display().to_string()))?;
        let start = Instant::now();
        let mut stats = IndexStats::default();

        let registry = self.extractor.registry();
        let files: Vec<(PathBuf, String, String)> = self
            .ignore
            .walk(&self.root)
            .into_iter()
            .filter_map(|path| {
                let language = registry.detect_language(&path)?.name.clone();
                let rel = relative_path(&self.root, &path);
                Some((path, rel, language))
            })
            .collect();
        stats.total_files = files.len();
        tracing::info!(root = %self.root.display(), total = stats.total_files, force, "symbol indexing started");

        let rows: Vec<(String, f64, String)> =
            sqlx::query_as("SELECT path, last_modified, content_hash FROM files")
                .fetch_all(&self.pool)
                .await?;
        let indexed: HashMap<String, (f64, String)> =
            rows.into_iter().map(|(p, m, h)| (p, (m, h))).collect();

        let current: HashSet<&str> = files.iter().map(|(_, rel, _)| rel.as_str()).collect();
        for path in indexed.keys().filter(|p| !current.contains(p.as_str())) {
            sqlx::query("DELETE FROM files WHERE path = ?")
                .bind(path)
                .execute(&self.pool)
                .await?;
            stats.files_deleted += 1;
            tracing::debug!(file = %path, "removed vanished file");
        }

        for (i, (path, rel, language)) in files.iter().enumerate() {
            match self
                .index_file(path, rel, language, indexed.get(rel), force)
                .await
            {
                Ok(FileOutcome::Skipped) => stats.files_skipped += 1,
                Ok(FileOutcome::Indexed {
                    symbols,
                    parse_error,
                }) => {
                    stats.files_indexed += 1;
                    stats.symbols_found += symbols;
                    *stats.languages.entry(language.clone()).or_insert(0) += 1;
                    if let Some(message) = parse_error {
                        stats.files_with_errors += 1;
                        tracing::debug!(file = %rel, "indexed with parse errors: {message}");
                        stats
                            .errors
                            .push(FileError::new(rel, FileErrorKind::ParseError, message));
                    }
                    tracing::debug!(
                        file = %rel,
                        symbols,
                        progress = format_args!("{}/{}", i + 1, stats.total_files),
                        "file indexed"
                    );
                }
                Err(err) => {
                    stats.files_failed += 1;
                    if err.kind == FileErrorKind::Encoding {
                        tracing::debug!(file = %rel, "skipping undecodable file");
                    } else {
                        tracing::warn!(file = %rel, kind = %err.kind, "failed to index: {}", err.message);
                    }
                    stats.errors.push(err);
                }
            }
        }

        if stats.files_indexed > 0 || stats.files_deleted > 0 || force {
            stats.patterns_detected = self.refresh_patterns().await?;
        }

        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('last_indexed', ?)")
            .bind(unix_now().to_string())
            .execute(&self.pool)
            .await?;

        stats.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        log_summary(&stats);
        Ok(stats)
    }

    async fn index_file(
        &self,
        path: &Path,
        rel: &str,
        language: &str,
        previous: Option<&(f64, String)>,
        force: bool,
    ) -> std::result::Result<FileOutcome, FileError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| FileError::new(rel, FileErrorKind::Io, e))?;
        let mtime = mtime_secs(&meta);
        if !force && previous.is_some_and(|(stored, _)| mtime <= *stored) {
            return Ok(FileOutcome::Skipped);
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FileError::new(rel, FileErrorKind::Io, e))?;
        let hash = content_hash(&bytes);
        let db_err = |e: sqlx::Error| FileError::new(rel, FileErrorKind::Database, e);

        // Touched but unchanged: remember the new mtime and move on.
        if !force && previous.is_some_and(|(_, stored)| *stored == hash) {
            sqlx::query("UPDATE files SET last_modified = ? WHERE path = ?")
                .bind(mtime)
                .bind(rel)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            return Ok(FileOutcome::Skipped);
        }

        let size = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
        let content =
            String::from_utf8(bytes).map_err(|e| FileError::new(rel, FileErrorKind::Encoding, e))?;
        let lines = i64::try_from(content.matches('\n').count() + 1).unwrap_or(i64::MAX);
        let extracted = self.extract(rel, language, &content);

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(rel)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query(
            "INSERT INTO files (path, language, size, lines, last_modified, indexed_at, \
             content_hash, symbol_count, import_count, file_type) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rel)
        .bind(language)
        .bind(size)
        .bind(lines)
        .bind(mtime)
        .bind(unix_now())
        .bind(&hash)
        .bind(i64::try_from(extracted.symbols.len()).unwrap_or(i64::MAX))
        .bind(i64::try_from(extracted.imports.len()).unwrap_or(i64::MAX))
        .bind(FileType::for_path(path).as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for sym in &extracted.symbols {
            sqlx::query(&format!(
                "INSERT INTO symbols ({SYMBOL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&sym.name)
            .bind(&sym.symbol_type)
            .bind(&sym.file_path)
            .bind(sym.line_number)
            .bind(&sym.language)
            .bind(&sym.category)
            .bind(&sym.docstring)
            .bind(&sym.signature)
            .bind(&sym.parent_symbol)
            .bind((!sym.modifiers.is_empty()).then(|| sym.modifiers.join(",")))
            .bind(i64::from(sym.is_exported))
            .bind(&sym.content_hash)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        for import in &extracted.imports {
            sqlx::query("INSERT INTO imports (file_path, import_name, import_type) VALUES (?, ?, 'module')")
                .bind(rel)
                .bind(&import.name)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(FileOutcome::Indexed {
            symbols: extracted.symbols.len(),
            parse_error: extracted.parse_error,
        })
    }

    /// Structural extraction, falling back to line regexes when it yields
    /// nothing or hits a syntax error.
    fn extract(&self, rel: &str, language: &str, content: &str) -> Extracted {
        let registry = self.extractor.registry();
        let mut found: Vec<(ExtractedSymbol, &'static str)> = Vec::new();
        let mut imports = Vec::new();
        let mut parse_error = None;

        if self.extractor.supports(language) {
            let ex = self.extractor.extract_source(rel, language, content);
            parse_error = ex.syntax_error.map(|line| format!("syntax error near line {line}"));
            found.extend(ex.symbols.into_iter().map(|s| (s, "treesitter_extracted")));
            imports = ex.imports;
        }

        if found.is_empty() || parse_error.is_some() {
            let (symbols, fallback_imports) = fallback::extract(rel, content, registry.lookup(language));
            for sym in symbols {
                let seen = found
                    .iter()
                    .any(|(s, _)| s.name == sym.name && s.start_line == sym.start_line);
                if !seen {
                    found.push((sym, "regex_extracted"));
                }
            }
            if imports.is_empty() {
                imports = fallback_imports;
            }
        }
        found.sort_by_key(|(s, _)| s.start_line);

        let lines: Vec<&str> = content.lines().collect();
        let symbols = found
            .iter()
            .map(|(sym, marker)| build_symbol(sym, marker, language, &lines))
            .collect();
        Extracted {
            symbols,
            imports,
            parse_error,
        }
    }

    /// Replace pattern rows from the current symbol table.
    async fn refresh_patterns(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM patterns").execute(&mut *tx).await?;

        let categories: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COUNT(*) AS cnt FROM symbols WHERE category IS NOT NULL \
             GROUP BY category HAVING cnt >= 2 ORDER BY category",
        )
        .fetch_all(&mut *tx)
        .await?;
        let mut count = 0;
        for (category, members) in categories {
            sqlx::query(
                "INSERT INTO patterns (pattern_name, pattern_type, file_path, symbol_name, line_number, description) \
                 VALUES (?, 'architecture', NULL, NULL, NULL, ?)",
            )
            .bind(format!("{} Pattern", patterns::title_case(&category)))
            .bind(format!("Found {members} {category} components"))
            .execute(&mut *tx)
            .await?;
            count += 1;
        }

        let classes: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT name, file_path, line_number FROM symbols \
             WHERE symbol_type IN ('class', 'interface') ORDER BY file_path, line_number",
        )
        .fetch_all(&mut *tx)
        .await?;
        for (name, file_path, line) in classes.into_iter().filter(|(n, _, _)| is_inheritance_anchor(n)) {
            sqlx::query(
                "INSERT INTO patterns (pattern_name, pattern_type, file_path, symbol_name, line_number, description) \
                 VALUES (?, 'inheritance', ?, ?, ?, 'Abstract base class for inheritance')",
            )
            .bind(format!("Base Class: {name}"))
            .bind(&file_path)
            .bind(&name)
            .bind(line)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }
        tx.commit().await?;
        Ok(count)
    }

    async fn query_symbols(&self, filter: &str, binds: &[&str], limit: Option<i64>) -> Result<Vec<SymbolInfo>> {
        let sql = match limit {
            Some(_) => format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE {filter} ORDER BY file_path, line_number LIMIT ?"),
            None => format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE {filter} ORDER BY line_number"),
        };
        let mut query = sqlx::query_as::<_, SymbolTuple>(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(symbol_from_tuple).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_category(&self, category: &str, limit: i64) -> Result<Vec<SymbolInfo>> {
        self.query_symbols("category = ?", &[category], Some(limit)).await
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_type(&self, symbol_type: &str, limit: i64) -> Result<Vec<SymbolInfo>> {
        self.query_symbols("symbol_type = ?", &[symbol_type], Some(limit)).await
    }

    /// Names matching a LIKE pattern; `*` is accepted as a wildcard alias for `%`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_name_pattern(&self, pattern: &str, limit: i64) -> Result<Vec<SymbolInfo>> {
        let pattern = pattern.replace('*', "%");
        self.query_symbols("name LIKE ?", &[pattern.as_str()], Some(limit)).await
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_symbols_in_file(&self, file_path: &str) -> Result<Vec<SymbolInfo>> {
        self.query_symbols("file_path = ?", &[file_path], None).await
    }

    /// Categorised class-like symbols, most architecturally central first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_key_components(&self, limit: i64) -> Result<Vec<SymbolInfo>> {
        let mut order = String::from("CASE category");
        for (i, category) in patterns::CATEGORY_PRIORITY.iter().enumerate() {
            order.push_str(&format!(" WHEN '{category}' THEN {}", i + 1));
        }
        order.push_str(&format!(" ELSE {} END", patterns::CATEGORY_PRIORITY.len() + 1));
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE category IS NOT NULL \
             AND symbol_type IN ('class', 'interface', 'struct', 'trait') \
             ORDER BY {order}, name LIMIT ?"
        );
        let rows: Vec<SymbolTuple> = sqlx::query_as(&sql).bind(limit).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(symbol_from_tuple).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_detected_patterns(&self) -> Result<Vec<PatternInfo>> {
        let rows: Vec<(String, String, Option<String>, Option<String>, Option<i64>, Option<String>)> =
            sqlx::query_as(
                "SELECT pattern_name, pattern_type, file_path, symbol_name, line_number, description \
                 FROM patterns ORDER BY pattern_type, pattern_name",
            )
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(
                |(pattern_name, pattern_type, file_path, symbol_name, line_number, description)| PatternInfo {
                    pattern_name,
                    pattern_type,
                    file_path,
                    symbol_name,
                    line_number,
                    description,
                },
            )
            .collect())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_file(&self, path: &str) -> Result<Option<FileInfo>> {
        type FileTuple = (String, String, i64, i64, f64, f64, String, i64, i64, String);
        let row: Option<FileTuple> = sqlx::query_as(
            "SELECT path, language, size, lines, last_modified, indexed_at, content_hash, \
             symbol_count, import_count, file_type FROM files WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|t| FileInfo {
            path: t.0,
            language: t.1,
            size: t.2,
            lines: t.3,
            last_modified: t.4,
            indexed_at: t.5,
            content_hash: t.6,
            symbol_count: t.7,
            import_count: t.8,
            file_type: if t.9 == "config" { FileType::Config } else { FileType::Source },
        }))
    }

    /// Imported module names recorded for `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_imports(&self, path: &str) -> Result<Vec<String>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT import_name FROM imports WHERE file_path = ? ORDER BY id")
                .bind(path)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn get_stats(&self) -> Result<StoreStats> {
        let count = |sql: &'static str| async move {
            sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await
        };
        let grouped = |sql: &'static str| async move {
            sqlx::query_as::<_, (String, i64)>(sql)
                .fetch_all(&self.pool)
                .await
                .map(|rows| rows.into_iter().collect::<BTreeMap<_, _>>())
        };

        Ok(StoreStats {
            total_files: count("SELECT COUNT(*) FROM files").await?,
            total_symbols: count("SELECT COUNT(*) FROM symbols").await?,
            total_imports: count("SELECT COUNT(*) FROM imports").await?,
            total_patterns: count("SELECT COUNT(*) FROM patterns").await?,
            source_files: count("SELECT COUNT(*) FROM files WHERE file_type = 'source'").await?,
            config_files: count("SELECT COUNT(*) FROM files WHERE file_type = 'config'").await?,
            by_language: grouped("SELECT language, COUNT(*) FROM files GROUP BY language").await?,
            by_type: grouped("SELECT symbol_type, COUNT(*) FROM symbols GROUP BY symbol_type").await?,
            by_category: grouped(
                "SELECT category, COUNT(*) FROM symbols WHERE category IS NOT NULL GROUP BY category",
            )
            .await?,
            last_indexed: self.last_indexed().await?,
        })
    }

    /// Unix time of the last completed pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn last_indexed(&self) -> Result<Option<f64>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM metadata WHERE key = 'last_indexed'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Drop every row. The next pass re-indexes everything.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["patterns", "imports", "symbols", "files", "metadata"] {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SymbolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolStore")
            .field("root", &self.root)
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}

/// Open a WAL-mode `SQLite` pool with foreign keys enforced.
///
/// `":memory:"` opens a private in-memory database.
pub(crate) async fn connect(path: &str) -> Result<SqlitePool> {
    let url = if path == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{path}?mode=rwc")
    };
    let opts = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?)
}

/// Blake3 hex digest truncated to 16 characters.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hex = blake3::hash(bytes).to_hex().to_string();
    hex.truncate(16);
    hex
}

pub(crate) fn mtime_secs(meta: &std::fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0.0, |d| d.as_secs_f64())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

fn has_word(line: &str, word: &str) -> bool {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|w| w == word)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Comment text on the line directly above `line_idx` (0-based).
fn docstring_before(lines: &[&str], line_idx: usize) -> Option<String> {
    let prev = lines.get(line_idx.checked_sub(1)?)?.trim();
    let marker = DOC_MARKERS.iter().find(|m| prev.starts_with(*m))?;
    let doc = prev[marker.len()..].trim_end_matches("*/").trim();
    (!doc.is_empty()).then(|| truncate_chars(doc, MAX_DOC_CHARS))
}

fn is_exported(language: &str, name: &str, def_line: &str) -> bool {
    let rule = VISIBILITY_RULES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, rule)| *rule);
    match rule {
        Some(Visibility::Underscore) => !name.starts_with('_'),
        Some(Visibility::Capitalised) => name.chars().next().is_some_and(char::is_uppercase),
        Some(Visibility::Keyword) => ["pub", "export", "public"].iter().any(|k| has_word(def_line, k)),
        None => true,
    }
}

fn build_symbol(sym: &ExtractedSymbol, marker: &str, language: &str, lines: &[&str]) -> SymbolInfo {
    let idx = sym.start_line.saturating_sub(1);
    let def_line = lines.get(idx).copied().unwrap_or_default();

    let mut modifiers: Vec<String> = Vec::new();
    for (keyword, modifier) in MODIFIER_KEYWORDS {
        if has_word(def_line, keyword) && !modifiers.iter().any(|m| m == modifier) {
            modifiers.push((*modifier).to_string());
        }
    }
    if sym.name.starts_with('_') && !sym.name.starts_with("__") && !modifiers.iter().any(|m| m == "private") {
        modifiers.push("private".to_string());
    }
    modifiers.push(marker.to_string());

    let end = sym.end_line.min(lines.len()).max(idx + 1);
    let body = lines.get(idx..end).map(|l| l.join("\n")).unwrap_or_default();

    SymbolInfo {
        name: sym.name.clone(),
        symbol_type: sym.kind.clone(),
        file_path: sym.file.clone(),
        line_number: i64::try_from(sym.start_line).unwrap_or(i64::MAX),
        language: language.to_string(),
        category: categorize_symbol(&sym.name).map(str::to_string),
        docstring: docstring_before(lines, idx),
        signature: (!def_line.trim().is_empty()).then(|| truncate_chars(def_line.trim(), MAX_DOC_CHARS)),
        parent_symbol: sym.parent.clone(),
        modifiers,
        is_exported: is_exported(language, &sym.name, def_line),
        content_hash: Some(content_hash(body.as_bytes())),
    }
}

fn log_summary(stats: &IndexStats) {
    if stats.files_indexed == 0 && stats.files_deleted == 0 {
        tracing::info!(unchanged = stats.files_skipped, "symbol index up to date");
        return;
    }
    tracing::info!(
        indexed = stats.files_indexed,
        deleted = stats.files_deleted,
        symbols = stats.symbols_found,
        with_errors = stats.files_with_errors,
        failed = stats.files_failed,
        duration_ms = stats.duration_ms,
        "symbol indexing complete"
    );
    let failed: Vec<&FileError> = stats
        .errors
        .iter()
        .filter(|e| e.kind != FileErrorKind::ParseError)
        .collect();
    for err in failed.iter().take(ERROR_SUMMARY_LIMIT) {
        tracing::warn!(file = %err.path, kind = %err.kind, "failed file");
    }
    if failed.len() > ERROR_SUMMARY_LIMIT {
        tracing::warn!(more = failed.len() - ERROR_SUMMARY_LIMIT, "further failed files omitted");
    }
}
