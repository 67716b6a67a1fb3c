//! Line-regex extraction for files the structural parser cannot handle.
//!
//! Accuracy is best-effort: the patterns recognise common declaration syntax
//! and make no attempt to follow any one grammar.

use std::sync::LazyLock;

use regex::Regex;

use crate::extractor::{ExtractedImport, ExtractedSymbol};
use crate::languages::LanguageConfig;

static SYMBOL_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^\s*class\s+(\w+)\s*[:(]", "class"),
        (r"^\s*(?:async\s+)?def\s+(\w+)\s*\(", "function"),
        (
            r"(?:export\s+)?(?:public\s+|private\s+|protected\s+)?(?:abstract\s+)?class\s+([A-Z][a-zA-Z0-9_]*)",
            "class",
        ),
        (r"(?:export\s+)?interface\s+([A-Z][a-zA-Z0-9_]*)", "interface"),
        (r"(?:pub\s+)?struct\s+([A-Z][a-zA-Z0-9_]*)", "struct"),
        (r"(?:export\s+)?type\s+([A-Z][a-zA-Z0-9_]*)\s*[=<]", "type"),
        (r"(?:export\s+)?(?:pub\s+)?enum\s+([A-Z][a-zA-Z0-9_]*)", "enum"),
        (r"(?:pub\s+)?trait\s+([A-Z][a-zA-Z0-9_]*)", "trait"),
        (r"(?:defmodule|module)\s+([A-Z][a-zA-Z0-9_:]*)", "module"),
        (r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+([a-z_][a-zA-Z0-9_]*)", "function"),
        (r"^func\s+(?:\([^)]+\)\s+)?([a-zA-Z_][a-zA-Z0-9_]*)", "function"),
        (r"^\s*(?:export\s+)?(?:async\s+)?function\s*\*?\s*([a-zA-Z_$][\w$]*)\s*\(", "function"),
        (
            r"(?:export\s+)?(?:default\s+)?const\s+([A-Z][a-zA-Z0-9_]*)\s*=",
            "component",
        ),
    ]
    .into_iter()
    .map(|(re, kind)| (Regex::new(re).unwrap(), kind))
    .collect()
});

static GENERIC_IMPORT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*from\s+([\w.]+)\s+import\b",
        r"^\s*import\s+([\w.]+(?:\s*,\s*[\w.]+)*)\s*$",
        r#"import\s+.*?from\s+['"]([^'"]+)['"]"#,
        r#"require\s*\(['"]([^'"]+)['"]\)"#,
        r"^\s*use\s+([a-zA-Z_][a-zA-Z0-9_:]*)",
    ]
    .into_iter()
    .map(|re| Regex::new(re).unwrap())
    .collect()
});

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Symbols and imports recognised line by line.
///
/// A `def` indented under a `class` becomes a method of that class. Every
/// symbol spans only its declaration line.
#[must_use]
pub fn extract(file: &str, content: &str, language: Option<&LanguageConfig>) -> (Vec<ExtractedSymbol>, Vec<ExtractedImport>) {
    let import_patterns: Vec<Regex> = language
        .map(|l| {
            l.import_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect::<Vec<_>>()
        })
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| GENERIC_IMPORT_PATTERNS.clone());

    let mut symbols = Vec::new();
    let mut imports = Vec::new();
    let mut open_class: Option<(String, usize)> = None;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let indent = indent_of(line);
        if !line.trim().is_empty()
            && open_class.as_ref().is_some_and(|(_, class_indent)| indent <= *class_indent)
        {
            open_class = None;
        }

        if let Some((caps, kind)) = SYMBOL_PATTERNS
            .iter()
            .find_map(|(re, kind)| re.captures(line).map(|c| (c, *kind)))
            && let Some(name) = caps.get(1)
        {
            let name = name.as_str().to_string();
            let parent = open_class.as_ref().map(|(n, _)| n.clone());
            let kind = if kind == "function" && parent.is_some() { "method" } else { kind };
            if kind == "class" {
                open_class = Some((name.clone(), indent));
            }
            symbols.push(ExtractedSymbol {
                name,
                kind: kind.to_string(),
                file: file.to_string(),
                start_line: line_no,
                end_line: line_no,
                parent: if kind == "class" { None } else { parent },
            });
            continue;
        }

        for re in &import_patterns {
            for caps in re.captures_iter(line) {
                let Some(m) = caps.get(1) else { continue };
                for name in m.as_str().split(',') {
                    let name = name.split(" as ").next().unwrap_or_default().trim();
                    if !name.is_empty() && !name.starts_with('(') {
                        imports.push(ExtractedImport {
                            name: name.to_string(),
                            line: line_no,
                        });
                    }
                }
            }
        }
    }
    (symbols, imports)
}
