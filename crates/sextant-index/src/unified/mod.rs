//! Tier-aware extraction facade.
//!
//! Every language goes through the tree-sitter extractor. Python then gets a
//! native syntax-tree pass, and tier 1 and 2 languages get language-server
//! hover enrichment when a [`HoverSource`] is attached. Later stages only fill
//! fields an earlier stage left empty.

pub mod hover;
pub mod native;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::extractor::{ExtractedEdge, ExtractedImport, ExtractedSymbol, TreeSitterExtractor};
use crate::languages::{LanguageTier, TierConfig};

pub use hover::{HoverInfo, HoverSource, parse_hover};

/// A symbol plus whatever typed detail the available tiers could recover.
///
/// Fields no stage could determine stay `None` or empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedSymbol {
    pub name: String,
    pub symbol_type: String,
    pub file_path: String,
    pub line_number: usize,
    pub end_line: usize,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub parent_symbol: Option<String>,
    pub return_type: Option<String>,
    pub parameters: Vec<String>,
    pub visibility: Option<String>,
    pub is_async: bool,
    pub decorators: Vec<String>,
    pub source_tier: LanguageTier,
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

impl EnrichedSymbol {
    fn from_extracted(symbol: ExtractedSymbol, tier: LanguageTier) -> Self {
        Self {
            name: symbol.name,
            symbol_type: symbol.kind,
            file_path: symbol.file,
            line_number: symbol.start_line,
            end_line: symbol.end_line,
            signature: None,
            docstring: None,
            parent_symbol: symbol.parent,
            return_type: None,
            parameters: Vec::new(),
            visibility: None,
            is_async: false,
            decorators: Vec::new(),
            source_tier: tier,
        }
    }

    /// `Parent.name`, or `name` at top level.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.parent_symbol {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        }
    }

    fn apply_native(&mut self, info: native::NativeInfo) {
        fill(&mut self.return_type, info.return_type);
        fill(&mut self.docstring, info.docstring);
        fill(&mut self.visibility, Some(info.visibility.to_string()));
        if self.parameters.is_empty() {
            self.parameters = info.parameters;
        }
        if self.decorators.is_empty() {
            self.decorators = info.decorators;
        }
        self.is_async |= info.is_async;
    }

    fn apply_hover(&mut self, info: HoverInfo) {
        fill(&mut self.signature, info.signature);
        fill(&mut self.return_type, info.return_type);
        fill(&mut self.docstring, info.docstring);
    }
}

/// Everything one file yields, with symbols already enriched.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub language: String,
    pub tier: TierConfig,
    pub symbols: Vec<EnrichedSymbol>,
    pub edges: Vec<ExtractedEdge>,
    pub imports: Vec<ExtractedImport>,
    /// 1-based line of the first syntax error, if the parse recovered from one.
    pub syntax_error: Option<usize>,
}

pub struct UnifiedExtractor {
    extractor: Arc<TreeSitterExtractor>,
    hover: Option<Arc<dyn HoverSource>>,
}

impl UnifiedExtractor {
    #[must_use]
    pub fn new(extractor: Arc<TreeSitterExtractor>) -> Self {
        Self { extractor, hover: None }
    }

    #[must_use]
    pub fn with_hover_source(mut self, hover: Arc<dyn HoverSource>) -> Self {
        self.hover = Some(hover);
        self
    }

    #[must_use]
    pub fn extractor(&self) -> &Arc<TreeSitterExtractor> {
        &self.extractor
    }

    /// Tree-sitter and native passes over in-memory `content`.
    #[must_use]
    pub fn extract_source(&self, file: &str, language: &str, content: &str) -> FileExtraction {
        let registry = self.extractor.registry();
        let tier = registry.tier(language);
        let canonical = registry
            .lookup(language)
            .map_or_else(|| language.to_lowercase(), |l| l.name.clone());

        let extraction = self.extractor.extract_source(file, &canonical, content);
        let mut symbols: Vec<EnrichedSymbol> = extraction
            .symbols
            .into_iter()
            .map(|s| EnrichedSymbol::from_extracted(s, tier.tier))
            .collect();

        if tier.has_native_ast
            && canonical == native::LANGUAGE
            && !symbols.is_empty()
            && let Some(tree) = self.extractor.parse(&canonical, content)
        {
            let mut infos = native::collect(&tree, content);
            for symbol in &mut symbols {
                if let Some(info) = infos.remove(&(symbol.name.clone(), symbol.line_number)) {
                    symbol.apply_native(info);
                }
            }
        }

        FileExtraction {
            language: canonical,
            tier,
            symbols,
            edges: extraction.edges,
            imports: extraction.imports,
            syntax_error: extraction.syntax_error,
        }
    }

    /// [`Self::extract_source`] plus hover enrichment when the tier allows it.
    pub async fn extract_file(&self, file: &str, language: &str, content: &str) -> FileExtraction {
        let mut out = self.extract_source(file, language, content);
        if out.tier.is_lsp_recommended()
            && !out.symbols.is_empty()
            && let Some(hover) = &self.hover
        {
            enrich_with_hover(hover.as_ref(), file, content, &mut out.symbols).await;
        }
        out
    }

    /// Enriched symbols for `path`, using every stage available.
    ///
    /// `language` is detected from the path when `None`; `content` is read
    /// from disk when `None`. Undetectable languages yield no symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is `None` and the file cannot be read.
    pub async fn extract_symbols(
        &self,
        path: &Path,
        language: Option<&str>,
        content: Option<&str>,
    ) -> Result<Vec<EnrichedSymbol>> {
        let Some((file, language, content)) = self.resolve(path, language, content)? else {
            return Ok(Vec::new());
        };
        Ok(self.extract_file(&file, &language, &content).await.symbols)
    }

    /// [`Self::extract_symbols`] without the language-server stage.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is `None` and the file cannot be read.
    pub fn extract_symbols_sync(
        &self,
        path: &Path,
        language: Option<&str>,
        content: Option<&str>,
    ) -> Result<Vec<EnrichedSymbol>> {
        let Some((file, language, content)) = self.resolve(path, language, content)? else {
            return Ok(Vec::new());
        };
        Ok(self.extract_source(&file, &language, &content).symbols)
    }

    fn resolve(
        &self,
        path: &Path,
        language: Option<&str>,
        content: Option<&str>,
    ) -> Result<Option<(String, String, String)>> {
        let language = match language {
            Some(l) => l.to_string(),
            None => match self.extractor.registry().detect_language(path) {
                Some(l) => l.name.clone(),
                None => {
                    tracing::debug!(path = %path.display(), "language not detected");
                    return Ok(None);
                }
            },
        };
        let content = match content {
            Some(c) => c.to_string(),
            None => std::fs::read_to_string(path)?,
        };
        Ok(Some((path.to_string_lossy().into_owned(), language, content)))
    }
}

impl std::fmt::Debug for UnifiedExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedExtractor")
            .field("hover", &self.hover.is_some())
            .finish_non_exhaustive()
    }
}

async fn enrich_with_hover(hover: &dyn HoverSource, file: &str, content: &str, symbols: &mut [EnrichedSymbol]) {
    if let Err(e) = hover.open_document(file, content).await {
        tracing::debug!(file, "hover document open failed: {e}");
        return;
    }
    let lines: Vec<&str> = content.lines().collect();
    for symbol in symbols.iter_mut() {
        let line = symbol.line_number.saturating_sub(1);
        let column = lines
            .get(line)
            .and_then(|l| l.find(symbol.name.as_str()))
            .unwrap_or(0)
            + symbol.name.len() / 2;
        match hover.hover(file, line, column).await {
            Ok(Some(contents)) => symbol.apply_hover(parse_hover(&contents)),
            Ok(None) => {}
            Err(e) => tracing::debug!(file, symbol = %symbol.name, "hover failed: {e}"),
        }
    }
    if let Err(e) = hover.close_document(file).await {
        tracing::debug!(file, "hover document close failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::IndexError;
    use crate::graph::BoxFuture;
    use crate::languages::LanguageRegistry;

    struct FakeHover {
        text: String,
        fail_line: Option<usize>,
        calls: AtomicUsize,
    }

    impl FakeHover {
        fn new(text: &str, fail_line: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                fail_line,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl HoverSource for FakeHover {
        fn open_document<'a>(&'a self, _path: &'a str, _content: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn hover<'a>(&'a self, _path: &'a str, line: usize, _column: usize) -> BoxFuture<'a, Result<Option<String>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_line == Some(line) {
                    return Err(IndexError::Other("server went away".into()));
                }
                Ok(Some(self.text.clone()))
            })
        }

        fn close_document<'a>(&'a self, _path: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn unified() -> UnifiedExtractor {
        let registry = Arc::new(LanguageRegistry::with_builtins());
        UnifiedExtractor::new(Arc::new(TreeSitterExtractor::new(registry)))
    }

    #[test]
    fn fill_keeps_existing() {
        let mut slot = Some("first");
        fill(&mut slot, Some("second"));
        assert_eq!(slot, Some("first"));
        let mut empty = None;
        fill(&mut empty, Some(1));
        assert_eq!(empty, Some(1));
    }

    #[test]
    fn unknown_extension_yields_nothing() {
        let got = unified()
            .extract_symbols_sync(Path::new("notes.unknownext"), None, Some("whatever"))
            .unwrap();
        assert!(got.is_empty());
    }

    #[cfg(feature = "lang-python")]
    const PY: &str = "async def fetch(key: str) -> bytes:\n    \"\"\"Fetch.\"\"\"\n    return b''\n\n\ndef plain(x):\n    return x\n";

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_native_pass() {
        let syms = unified()
            .extract_symbols_sync(Path::new("m.py"), None, Some(PY))
            .unwrap();
        let fetch = syms.iter().find(|s| s.name == "fetch").unwrap();
        assert!(fetch.is_async);
        assert_eq!(fetch.return_type.as_deref(), Some("bytes"));
        assert_eq!(fetch.parameters, vec!["key: str"]);
        assert_eq!(fetch.docstring.as_deref(), Some("Fetch."));
        assert_eq!(fetch.visibility.as_deref(), Some("public"));
        assert_eq!(fetch.source_tier, LanguageTier::Tier1);
        assert_eq!(fetch.signature, None);
    }

    #[cfg(feature = "lang-python")]
    #[tokio::test]
    async fn hover_fills_only_empty_fields() {
        let hover = FakeHover::new("```python\ndef fetch(key: str) -> str\n```\n---\nFrom hover.", None);
        let ex = unified().with_hover_source(hover.clone());
        let syms = ex.extract_symbols(Path::new("m.py"), None, Some(PY)).await.unwrap();

        let fetch = syms.iter().find(|s| s.name == "fetch").unwrap();
        assert_eq!(fetch.signature.as_deref(), Some("def fetch(key: str) -> str"));
        assert_eq!(fetch.return_type.as_deref(), Some("bytes"));
        assert_eq!(fetch.docstring.as_deref(), Some("Fetch."));

        let plain = syms.iter().find(|s| s.name == "plain").unwrap();
        assert_eq!(plain.return_type.as_deref(), Some("str"));
        assert_eq!(plain.docstring.as_deref(), Some("From hover."));
        assert_eq!(hover.calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(feature = "lang-python")]
    #[tokio::test]
    async fn hover_failure_skips_one_symbol() {
        // `fetch` starts on 0-based line 0
        let hover = FakeHover::new("def f() -> int", Some(0));
        let ex = unified().with_hover_source(hover);
        let syms = ex.extract_symbols(Path::new("m.py"), None, Some(PY)).await.unwrap();
        let fetch = syms.iter().find(|s| s.name == "fetch").unwrap();
        assert_eq!(fetch.signature, None);
        let plain = syms.iter().find(|s| s.name == "plain").unwrap();
        assert_eq!(plain.signature.as_deref(), Some("def f() -> int"));
    }

    #[cfg(feature = "lang-config")]
    #[tokio::test]
    async fn tier3_skips_hover() {
        let hover = FakeHover::new("anything", None);
        let ex = unified().with_hover_source(hover.clone());
        let out = ex
            .extract_file("run.sh", "bash", "greet() {\n  echo hi\n}\n")
            .await;
        assert_eq!(out.tier.tier, LanguageTier::Tier3);
        assert_eq!(hover.calls.load(Ordering::SeqCst), 0);
    }
}
