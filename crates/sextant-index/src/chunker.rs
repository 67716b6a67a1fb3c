//! Symbol-bounded, token-budgeted chunking for embedding.
//!
//! Each file goes through a fallback chain: boundary-aware chunking when the
//! extractor finds symbols, section chunking for YAML and TOML, and a sliding
//! window for everything else. Every non-summary chunk is cut from the source
//! verbatim, so the line ranges of those chunks cover the whole file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::extractor::{ExtractedImport, ExtractedSymbol, TreeSitterExtractor};
use crate::ignore_policy::{IgnorePolicy, relative_path};

/// Lower bound for the sliding-window step, in characters.
const MIN_STEP_CHARS: usize = 100;

/// Names listed in summary chunks before eliding the rest.
const SUMMARY_NAMES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// One chunk per top-level symbol.
    SymbolOnly,
    /// Symbols longer than `large_symbol_threshold` lines are split into a
    /// header chunk and overlapping body chunks.
    #[default]
    BodyAware,
    /// Body-aware, plus classes are broken into a summary and one chunk per member.
    Hierarchical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub strategy: ChunkingStrategy,
    pub max_chunk_tokens: usize,
    pub overlap_tokens: usize,
    /// Conservative characters-per-token estimate.
    pub chars_per_token: f64,
    /// Gap text between symbols becomes its own chunk only above this many
    /// non-whitespace characters.
    pub min_chunk_size: usize,
    /// Lines above which a symbol body is chunked separately.
    pub large_symbol_threshold: usize,
    pub max_subchunks: usize,
    pub max_window_chunks: usize,
    pub include_file_summary: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::BodyAware,
            max_chunk_tokens: 512,
            overlap_tokens: 64,
            chars_per_token: 3.5,
            min_chunk_size: 50,
            large_symbol_threshold: 30,
            max_subchunks: 10,
            max_window_chunks: 100,
            include_file_summary: true,
        }
    }
}

impl ChunkConfig {
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn max_chunk_chars(&self) -> usize {
        ((self.max_chunk_tokens as f64 * self.chars_per_token) as usize).max(1)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn overlap_chars(&self) -> usize {
        (self.overlap_tokens as f64 * self.chars_per_token) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkType {
    FileSummary,
    ClassSummary,
    Function,
    Class,
    Method,
    MethodHeader,
    MethodBody,
    ModuleCode,
    ImportBlock,
    ConfigSection,
    Window,
    /// Piece of an oversized symbol, tagged with the symbol's chunk kind.
    Part(String),
}

impl ChunkType {
    /// Summary chunks are synthesized text rather than a verbatim source span.
    #[must_use]
    pub fn is_summary(&self) -> bool {
        matches!(self, Self::FileSummary | Self::ImportBlock)
    }

    fn for_symbol(kind: &str) -> Self {
        match kind {
            "class" | "struct" | "interface" | "trait" | "enum" | "impl" => Self::Class,
            "method" => Self::Method,
            _ => Self::Function,
        }
    }

    fn part_of(&self) -> Self {
        Self::Part(self.to_string())
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FileSummary => "file_summary",
            Self::ClassSummary => "class_summary",
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::MethodHeader => "method_header",
            Self::MethodBody => "method_body",
            Self::ModuleCode => "module_code",
            Self::ImportBlock => "import_block",
            Self::ConfigSection => "config_section",
            Self::Window => "window",
            Self::Part(kind) => return write!(f, "{kind}_part"),
        };
        f.write_str(s)
    }
}

impl Serialize for ChunkType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A unit of text ready for embedding.
///
/// Ids are hierarchical (`path:Symbol`, `path:Class.method`,
/// `path:Symbol:body:N`) so every chunk of a file shares the `path:` prefix.
#[derive(Debug, Clone, Serialize)]
pub struct CodeChunk {
    pub id: String,
    pub content: String,
    pub chunk_type: ChunkType,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub symbol_type: Option<String>,
    /// 1-based, inclusive.
    pub line_start: usize,
    pub line_end: usize,
    pub parent_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl CodeChunk {
    fn new(id: String, content: String, chunk_type: ChunkType, file_path: &str) -> Self {
        Self {
            id,
            content,
            chunk_type,
            file_path: file_path.to_string(),
            symbol_name: None,
            symbol_type: None,
            line_start: 1,
            line_end: 1,
            parent_id: None,
            metadata: BTreeMap::new(),
        }
    }

    fn lines(mut self, start: usize, end: usize) -> Self {
        self.line_start = start;
        self.line_end = end.max(start);
        self
    }

    fn meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn is_oversized(&self) -> bool {
        self.metadata.get("oversized").is_some_and(|v| v == "true")
    }

    /// Flat metadata for a vector store document.
    #[must_use]
    pub fn document_metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::Value;

        let mut map = serde_json::Map::new();
        map.insert("chunk_type".into(), Value::String(self.chunk_type.to_string()));
        map.insert("file_path".into(), Value::String(self.file_path.clone()));
        if let Some(name) = &self.symbol_name {
            map.insert("symbol_name".into(), Value::String(name.clone()));
        }
        if let Some(kind) = &self.symbol_type {
            map.insert("symbol_type".into(), Value::String(kind.clone()));
        }
        map.insert("line_start".into(), Value::from(self.line_start));
        map.insert("line_end".into(), Value::from(self.line_end));
        if let Some(parent) = &self.parent_id {
            map.insert("parent_id".into(), Value::String(parent.clone()));
        }
        for (k, v) in &self.metadata {
            map.entry(k.clone()).or_insert_with(|| Value::String(v.clone()));
        }
        map
    }
}

/// Source text with precomputed line offsets.
struct Source<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> Source<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' && i + 1 < text.len() {
                starts.push(i + 1);
            }
        }
        Self { text, starts }
    }

    fn line_count(&self) -> usize {
        if self.text.is_empty() { 0 } else { self.starts.len() }
    }

    /// Byte span of lines `start..=end` (1-based), including the final newline.
    fn span(&self, start: usize, end: usize) -> (usize, usize) {
        let from = self.starts[start - 1];
        let to = self.starts.get(end).copied().unwrap_or(self.text.len());
        (from, to)
    }

    fn lines(&self, start: usize, end: usize) -> &'a str {
        let (from, to) = self.span(start, end);
        &self.text[from..to]
    }

    /// 1-based line containing byte `offset`.
    fn line_at(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    oversized: bool,
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, mut i: usize) -> usize {
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Sliding-window cut points over `text[from..to]`.
///
/// Each window prefers to end on a newline that lies past half the window;
/// otherwise it cuts exactly at `max`. The step never drops below
/// `max(max / 2, MIN_STEP_CHARS)` (capped at the window length), so any
/// overlap setting makes progress. At most `limit` pieces are produced.
fn window_pieces(text: &str, from: usize, to: usize, max: usize, overlap: usize, limit: usize) -> Vec<Piece> {
    let mut out = Vec::new();
    if from >= to || limit == 0 {
        return out;
    }
    let max = max.max(1);
    let min_step = (max / 2).max(MIN_STEP_CHARS);
    let mut pos = from;
    loop {
        let mut end = floor_boundary(text, (pos + max).min(to));
        if end <= pos {
            end = ceil_boundary(text, pos + 1);
        }
        if end < to
            && let Some(nl) = text[pos..end].rfind('\n')
            && nl > max / 2
        {
            end = pos + nl + 1;
        }
        out.push(Piece {
            start: pos,
            end,
            oversized: false,
        });
        if end >= to {
            break;
        }
        if out.len() >= limit {
            tracing::debug!(limit, "window limit reached, remaining text dropped");
            break;
        }
        let next = end.saturating_sub(overlap).max(pos + min_step).min(end);
        pos = ceil_boundary(text, next);
    }
    out
}

pub struct CodeChunker {
    config: ChunkConfig,
    extractor: Arc<TreeSitterExtractor>,
}

impl CodeChunker {
    #[must_use]
    pub fn new(config: ChunkConfig, extractor: Arc<TreeSitterExtractor>) -> Self {
        Self { config, extractor }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Chunk one file's content.
    ///
    /// `language` is detected from `rel_path` when not given. Empty or
    /// whitespace-only content yields no chunks.
    #[must_use]
    pub fn chunk_file(&self, rel_path: &str, language: Option<&str>, content: &str) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let registry = self.extractor.registry();
        let language = language.map(str::to_string).or_else(|| {
            registry
                .detect_language(Path::new(rel_path))
                .map(|l| l.name.clone())
        });

        if let Some(lang) = language.as_deref() {
            if self.extractor.supports(lang) {
                let ex = self.extractor.extract_source(rel_path, lang, content);
                if !ex.symbols.is_empty() {
                    return self.chunk_symbols(rel_path, lang, content, &ex.symbols, &ex.imports);
                }
            }
            if registry.is_config_language(lang)
                && let Some(chunks) = self.chunk_config(rel_path, lang, content)
            {
                return chunks;
            }
        }

        self.chunk_window(rel_path, language.as_deref().unwrap_or("text"), content)
    }

    /// Boundary-aware chunking over known symbols.
    #[must_use]
    pub fn chunk_symbols(
        &self,
        rel_path: &str,
        language: &str,
        content: &str,
        symbols: &[ExtractedSymbol],
        imports: &[ExtractedImport],
    ) -> Vec<CodeChunk> {
        let src = Source::new(content);
        let n = src.line_count();
        if n == 0 {
            return Vec::new();
        }
        let top = top_level(symbols, n);
        if top.is_empty() {
            return self.chunk_window(rel_path, language, content);
        }

        let mut chunks = Vec::new();
        if self.config.include_file_summary {
            let names: Vec<String> = top.iter().map(|s| s.qualified_name()).collect();
            chunks.push(self.file_summary(rel_path, language, n, &names, "boundary_aware"));
        }
        if !imports.is_empty() {
            chunks.push(self.import_block(rel_path, language, imports));
        }

        let mut module_idx = 0;
        let segments = segments(&src, &top, 1, n, self.config.min_chunk_size);
        for seg in segments {
            match seg.symbol {
                None => {
                    for piece in self.pieces(&src, seg.start, seg.end, false) {
                        let (ls, le) = (src.line_at(piece.start), src.line_at(piece.end - 1));
                        chunks.push(
                            CodeChunk::new(
                                format!("{rel_path}:__module__:{module_idx}"),
                                content[piece.start..piece.end].to_string(),
                                ChunkType::ModuleCode,
                                rel_path,
                            )
                            .lines(ls, le)
                            .meta("language", language),
                        );
                        module_idx += 1;
                    }
                }
                Some(sym) => {
                    let members = if self.config.strategy == ChunkingStrategy::Hierarchical
                        && ChunkType::for_symbol(&sym.kind) == ChunkType::Class
                    {
                        members_of(symbols, sym)
                    } else {
                        Vec::new()
                    };
                    if members.is_empty() {
                        self.emit_symbol(&mut chunks, &src, rel_path, language, sym, seg.start, seg.end, None);
                    } else {
                        self.emit_class(&mut chunks, &src, rel_path, language, sym, &members, seg.start, seg.end);
                    }
                }
            }
        }
        chunks
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_symbol(
        &self,
        out: &mut Vec<CodeChunk>,
        src: &Source<'_>,
        rel_path: &str,
        language: &str,
        sym: &ExtractedSymbol,
        start: usize,
        end: usize,
        parent_id: Option<&str>,
    ) {
        let qualified = sym.qualified_name();
        let id = format!("{rel_path}:{qualified}");
        let kind = ChunkType::for_symbol(&sym.kind);
        let text = src.lines(start, end);
        let line_count = end - start + 1;
        let max = self.config.max_chunk_chars();

        let base = |id: String, content: String, chunk_type: ChunkType| {
            let mut c = CodeChunk::new(id, content, chunk_type, rel_path)
                .meta("language", language)
                .meta("line_count", line_count);
            c.symbol_name = Some(sym.name.clone());
            c.symbol_type = Some(sym.kind.clone());
            c.parent_id = parent_id.map(str::to_string);
            c
        };

        let body_split = self.config.strategy != ChunkingStrategy::SymbolOnly
            && line_count > self.config.large_symbol_threshold;

        if text.len() <= max && !body_split {
            out.push(base(id, text.to_string(), kind).lines(start, end));
            return;
        }

        if body_split {
            // Header spans any absorbed leading lines through the signature
            // line. Leading lines that would push it past the budget are
            // windowed into their own chunks instead.
            let header_end = sym.start_line.clamp(start, end);
            let header_start = if header_end > start && src.lines(start, header_end).len() > max {
                let (l_from, l_to) = src.span(start, header_end - 1);
                let pieces = window_pieces(
                    src.text,
                    l_from,
                    l_to,
                    max,
                    self.config.overlap_chars(),
                    self.config.max_subchunks,
                );
                for (i, p) in pieces.iter().enumerate() {
                    let mut c = base(
                        format!("{id}:lead:{i}"),
                        src.text[p.start..p.end].to_string(),
                        ChunkType::MethodHeader,
                    )
                    .meta("chunk_index", i)
                    .lines(src.line_at(p.start), src.line_at(p.end - 1));
                    c.parent_id = Some(id.clone());
                    out.push(c);
                }
                header_end
            } else {
                start
            };
            let header = src.lines(header_start, header_end);
            let mut header_chunk = base(id.clone(), header.to_string(), ChunkType::MethodHeader)
                .lines(header_start, header_end);
            if header.len() > max {
                header_chunk = header_chunk.meta("oversized", true);
            }
            out.push(header_chunk);
            if header_end < end {
                let (b_from, b_to) = src.span(header_end + 1, end);
                let pieces = window_pieces(
                    src.text,
                    b_from,
                    b_to,
                    max,
                    self.config.overlap_chars(),
                    self.config.max_subchunks,
                );
                for (i, p) in pieces.iter().enumerate() {
                    let mut c = base(
                        format!("{id}:body:{i}"),
                        src.text[p.start..p.end].to_string(),
                        ChunkType::MethodBody,
                    )
                    .meta("chunk_index", i)
                    .lines(src.line_at(p.start), src.line_at(p.end - 1));
                    c.parent_id = Some(id.clone());
                    out.push(c);
                }
            }
            return;
        }

        for (i, p) in self.pieces(src, start, end, true).iter().enumerate() {
            let mut c = base(
                format!("{id}:part:{i}"),
                src.text[p.start..p.end].to_string(),
                kind.part_of(),
            )
            .meta("chunk_index", i)
            .lines(src.line_at(p.start), src.line_at(p.end - 1));
            if p.oversized {
                c = c.meta("oversized", true);
            }
            c.parent_id = Some(id.clone());
            out.push(c);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_class(
        &self,
        out: &mut Vec<CodeChunk>,
        src: &Source<'_>,
        rel_path: &str,
        language: &str,
        class: &ExtractedSymbol,
        members: &[&ExtractedSymbol],
        start: usize,
        end: usize,
    ) {
        let class_id = format!("{rel_path}:{}", class.name);
        let header_end = members[0].start_line.saturating_sub(1).max(start);
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        let header_text = src.lines(start, header_end);
        let max = self.config.max_chunk_chars();

        let summary = |id: String, content: String, chunk_type: ChunkType| {
            let mut c = CodeChunk::new(id, content, chunk_type, rel_path)
                .meta("language", language)
                .meta("methods", names.join(", "))
                .meta("method_count", names.len());
            c.symbol_name = Some(class.name.clone());
            c.symbol_type = Some(class.kind.clone());
            c
        };

        if header_text.len() <= max {
            out.push(
                summary(class_id.clone(), header_text.to_string(), ChunkType::ClassSummary)
                    .lines(start, header_end),
            );
        } else {
            for (i, p) in self.pieces(src, start, header_end, true).iter().enumerate() {
                let mut c = summary(
                    format!("{class_id}:part:{i}"),
                    src.text[p.start..p.end].to_string(),
                    ChunkType::ClassSummary.part_of(),
                )
                .lines(src.line_at(p.start), src.line_at(p.end - 1));
                if p.oversized {
                    c = c.meta("oversized", true);
                }
                c.parent_id = Some(class_id.clone());
                out.push(c);
            }
        }

        if header_end >= end {
            return;
        }
        // Gaps between members are absorbed by the following member.
        let mut cursor = header_end + 1;
        for (i, member) in members.iter().enumerate() {
            let m_end = if i + 1 == members.len() {
                end
            } else {
                member.end_line.clamp(cursor, members[i + 1].start_line.saturating_sub(1).max(cursor))
            };
            let mut as_method = (*member).clone();
            as_method.kind = "method".to_string();
            as_method.parent = Some(class.name.clone());
            self.emit_symbol(out, src, rel_path, language, &as_method, cursor, m_end, Some(&class_id));
            cursor = m_end + 1;
            if cursor > end {
                break;
            }
        }
    }

    /// Window pieces over lines `start..=end`, keeping an overlong first line whole.
    fn pieces(&self, src: &Source<'_>, start: usize, end: usize, protect_header: bool) -> Vec<Piece> {
        let (from, to) = src.span(start, end);
        let max = self.config.max_chunk_chars();
        let overlap = self.config.overlap_chars();
        let limit = self.config.max_subchunks;

        if protect_header {
            let (h_from, h_to) = src.span(start, start);
            if h_to - h_from > max {
                let mut out = vec![Piece {
                    start: h_from,
                    end: h_to,
                    oversized: true,
                }];
                out.extend(window_pieces(src.text, h_to, to, max, overlap, limit.saturating_sub(1)));
                return out;
            }
        }
        window_pieces(src.text, from, to, max, overlap, limit)
    }

    /// One chunk per YAML top-level key or TOML `[section]`.
    ///
    /// Returns `None` when the format is not sectioned or no section is found.
    #[must_use]
    pub fn chunk_config(&self, rel_path: &str, language: &str, content: &str) -> Option<Vec<CodeChunk>> {
        let src = Source::new(content);
        let n = src.line_count();
        let sections = match language {
            "yaml" => yaml_sections(&src),
            "toml" => toml_sections(&src),
            _ => return None,
        };
        if sections.is_empty() {
            return None;
        }

        let mut chunks = Vec::new();
        if self.config.include_file_summary {
            let names: Vec<String> = sections.iter().map(|s| s.0.clone()).collect();
            chunks.push(self.file_summary(rel_path, language, n, &names, "config_aware"));
        }
        let max = self.config.max_chunk_chars();
        for (name, start, end) in sections {
            let id = format!("{rel_path}:section:{name}");
            let text = src.lines(start, end);
            let mk = |id: String, content: String, chunk_type: ChunkType| {
                let mut c = CodeChunk::new(id, content, chunk_type, rel_path).meta("language", language);
                c.symbol_name = Some(name.clone());
                c.symbol_type = Some("config_section".to_string());
                c
            };
            if text.len() <= max {
                chunks.push(mk(id, text.to_string(), ChunkType::ConfigSection).lines(start, end));
            } else {
                for (i, p) in self.pieces(&src, start, end, true).iter().enumerate() {
                    let mut c = mk(
                        format!("{id}:part:{i}"),
                        content[p.start..p.end].to_string(),
                        ChunkType::ConfigSection.part_of(),
                    )
                    .lines(src.line_at(p.start), src.line_at(p.end - 1));
                    if p.oversized {
                        c = c.meta("oversized", true);
                    }
                    chunks.push(c);
                }
            }
        }
        Some(chunks)
    }

    /// Flat overlapping windows, for undetected languages or files with no symbols.
    #[must_use]
    pub fn chunk_window(&self, rel_path: &str, language: &str, content: &str) -> Vec<CodeChunk> {
        let src = Source::new(content);
        let n = src.line_count();
        if n == 0 {
            return Vec::new();
        }
        let mut chunks = Vec::new();
        if self.config.include_file_summary {
            chunks.push(self.file_summary(rel_path, language, n, &[], "sliding_window"));
        }
        let pieces = window_pieces(
            content,
            0,
            content.len(),
            self.config.max_chunk_chars(),
            self.config.overlap_chars(),
            self.config.max_window_chunks,
        );
        for (i, p) in pieces.iter().enumerate() {
            let (ls, le) = (src.line_at(p.start), src.line_at(p.end - 1));
            chunks.push(
                CodeChunk::new(
                    format!("{rel_path}:window:{i}:L{ls}-L{le}"),
                    content[p.start..p.end].to_string(),
                    ChunkType::Window,
                    rel_path,
                )
                .lines(ls, le)
                .meta("language", language)
                .meta("chunk_index", i)
                .meta("chunking", "sliding_window"),
            );
        }
        chunks
    }

    fn file_summary(&self, rel_path: &str, language: &str, lines: usize, names: &[String], chunking: &str) -> CodeChunk {
        let mut text = format!("File: {rel_path}\nLanguage: {language}\nLines: {lines}");
        if !names.is_empty() {
            let shown: Vec<&str> = names.iter().take(SUMMARY_NAMES).map(String::as_str).collect();
            text.push_str(&format!("\nContains: {}", shown.join(", ")));
            if names.len() > SUMMARY_NAMES {
                text.push_str(&format!("\n  ... and {} more", names.len() - SUMMARY_NAMES));
            }
        }
        CodeChunk::new(
            format!("{rel_path}:__file__"),
            truncate(&text, self.config.max_chunk_chars()),
            ChunkType::FileSummary,
            rel_path,
        )
        .lines(1, lines)
        .meta("language", language)
        .meta("symbol_count", names.len())
        .meta("chunking", chunking)
    }

    fn import_block(&self, rel_path: &str, language: &str, imports: &[ExtractedImport]) -> CodeChunk {
        let names: Vec<&str> = imports.iter().map(|i| i.name.as_str()).collect();
        let first = imports.iter().map(|i| i.line).min().unwrap_or(1);
        let last = imports.iter().map(|i| i.line).max().unwrap_or(first);
        CodeChunk::new(
            format!("{rel_path}:__imports__"),
            truncate(
                &format!("File: {rel_path}\nImports: {}", names.join(", ")),
                self.config.max_chunk_chars(),
            ),
            ChunkType::ImportBlock,
            rel_path,
        )
        .lines(first, last)
        .meta("language", language)
        .meta("import_count", imports.len())
    }
}

impl std::fmt::Debug for CodeChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeChunker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    text[..floor_boundary(text, max)].to_string()
}

/// Outermost symbols in line order, with end lines clamped to the file.
fn top_level(symbols: &[ExtractedSymbol], line_count: usize) -> Vec<&ExtractedSymbol> {
    outermost(symbols.iter(), line_count)
}

fn outermost<'a>(
    symbols: impl Iterator<Item = &'a ExtractedSymbol>,
    line_count: usize,
) -> Vec<&'a ExtractedSymbol> {
    let mut sorted: Vec<&ExtractedSymbol> = symbols
        .filter(|s| s.start_line >= 1 && s.start_line <= line_count)
        .collect();
    sorted.sort_by(|a, b| a.start_line.cmp(&b.start_line).then(b.end_line.cmp(&a.end_line)));
    let mut out: Vec<&ExtractedSymbol> = Vec::new();
    let mut last_end = 0;
    for sym in sorted {
        if sym.start_line > last_end {
            last_end = sym.end_line.min(line_count);
            out.push(sym);
        }
    }
    out
}

/// Direct members of a class-like symbol.
fn members_of<'a>(symbols: &'a [ExtractedSymbol], class: &ExtractedSymbol) -> Vec<&'a ExtractedSymbol> {
    outermost(
        symbols
            .iter()
            .filter(|s| s.start_line > class.start_line && s.end_line <= class.end_line),
        class.end_line,
    )
}

struct Segment<'a> {
    start: usize,
    end: usize,
    symbol: Option<&'a ExtractedSymbol>,
}

/// Partition lines `first..=last` into symbol spans and module-code gaps.
///
/// Gaps below `min_size` non-whitespace characters are absorbed by the next
/// symbol, or by the previous one at end of file.
fn segments<'a>(
    src: &Source<'_>,
    top: &[&'a ExtractedSymbol],
    first: usize,
    last: usize,
    min_size: usize,
) -> Vec<Segment<'a>> {
    let mut out: Vec<Segment<'a>> = Vec::new();
    let mut cursor = first;
    for sym in top {
        let s_end = sym.end_line.min(last).max(sym.start_line);
        let mut s_start = sym.start_line;
        if s_start > cursor {
            if non_ws_len(src.lines(cursor, s_start - 1)) >= min_size {
                out.push(Segment {
                    start: cursor,
                    end: s_start - 1,
                    symbol: None,
                });
            } else {
                s_start = cursor;
            }
        }
        out.push(Segment {
            start: s_start,
            end: s_end,
            symbol: Some(sym),
        });
        cursor = s_end + 1;
    }
    if cursor <= last {
        let gap_is_large = non_ws_len(src.lines(cursor, last)) >= min_size;
        match out.last_mut() {
            Some(prev) if !gap_is_large => prev.end = last,
            _ => out.push(Segment {
                start: cursor,
                end: last,
                symbol: None,
            }),
        }
    }
    out
}

fn non_ws_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

fn yaml_sections(src: &Source<'_>) -> Vec<(String, usize, usize)> {
    let n = src.line_count();
    let mut heads: Vec<(String, usize)> = Vec::new();
    for line_no in 1..=n {
        let line = src.lines(line_no, line_no).trim_end();
        if line.is_empty() || line.starts_with(char::is_whitespace) || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        if let Some((key, _)) = line.split_once(':') {
            let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
            if !key.is_empty() {
                heads.push((key.to_string(), line_no));
            }
        }
    }
    close_sections(heads, n)
}

fn toml_sections(src: &Source<'_>) -> Vec<(String, usize, usize)> {
    let n = src.line_count();
    let mut heads: Vec<(String, usize)> = Vec::new();
    for line_no in 1..=n {
        let line = src.lines(line_no, line_no).trim();
        if let Some(rest) = line.strip_prefix('[')
            && let Some(end) = rest.find(']')
        {
            let name = rest[..end].trim_matches(|c| c == '[' || c == ']').trim();
            if !name.is_empty() {
                heads.push((name.to_string(), line_no));
            }
        }
    }
    if heads.is_empty() {
        return Vec::new();
    }
    // Keys before the first table form an implicit root section.
    if heads[0].1 > 1 && non_ws_len(src.lines(1, heads[0].1 - 1)) > 0 {
        heads.insert(0, ("root".to_string(), 1));
    }
    close_sections(heads, n)
}

/// Turn section heads into `(name, start, end)`, the first starting at line 1.
fn close_sections(heads: Vec<(String, usize)>, n: usize) -> Vec<(String, usize, usize)> {
    let mut out = Vec::with_capacity(heads.len());
    for (i, (name, start)) in heads.iter().enumerate() {
        let start = if i == 0 { 1 } else { *start };
        let end = heads.get(i + 1).map_or(n, |(_, next)| next - 1);
        out.push((name.clone(), start, end.max(start)));
    }
    out
}

/// Chunk every text file under `root` that passes `ignore`.
///
/// Unreadable and binary files are skipped with a debug log.
#[must_use]
pub fn chunk_codebase(
    root: &Path,
    extractor: &Arc<TreeSitterExtractor>,
    config: &ChunkConfig,
    ignore: &IgnorePolicy,
) -> Vec<CodeChunk> {
    let chunker = CodeChunker::new(config.clone(), Arc::clone(extractor));
    let mut all = Vec::new();
    for path in ignore.walk(root) {
        let rel = relative_path(root, &path);
        let content = match std::fs::read(&path) {
            Ok(bytes) if !bytes.contains(&0) => match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(_) => {
                    tracing::debug!(file = %rel, "skipping non-utf8 file");
                    continue;
                }
            },
            Ok(_) => {
                tracing::debug!(file = %rel, "skipping binary file");
                continue;
            }
            Err(e) => {
                tracing::debug!(file = %rel, "read failed: {e}");
                continue;
            }
        };
        let chunks = chunker.chunk_file(&rel, None, &content);
        tracing::debug!(file = %rel, chunks = chunks.len(), "file chunked");
        all.extend(chunks);
    }
    tracing::info!(root = %root.display(), chunks = all.len(), "codebase chunked");
    all
}
