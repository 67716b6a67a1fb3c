//! Language-server hover access and hover-text parsing.

use crate::error::Result;
use crate::graph::BoxFuture;

/// Source of hover text for a position in an open document.
///
/// Implemented by whatever owns the language-server connections.
pub trait HoverSource: Send + Sync {
    fn open_document<'a>(&'a self, path: &'a str, content: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Hover contents at a 0-based `line` and `column`, if the server has any.
    fn hover<'a>(&'a self, path: &'a str, line: usize, column: usize) -> BoxFuture<'a, Result<Option<String>>>;

    fn close_document<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Fields recovered from hover text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverInfo {
    pub signature: Option<String>,
    pub return_type: Option<String>,
    pub docstring: Option<String>,
}

/// Extract a signature, return type and docstring from hover markdown.
///
/// Handles the common server formats:
/// `def foo(x: int) -> str`, `(method) Class.foo(x: number): string`,
/// and `func (r *T) Method(x int) string`.
#[must_use]
pub fn parse_hover(contents: &str) -> HoverInfo {
    let mut info = HoverInfo::default();
    let mut doc_lines = Vec::new();
    let mut in_doc = false;

    for line in contents.trim().lines().map(str::trim) {
        if line.starts_with("```") {
            continue;
        }
        if line.starts_with("---") {
            in_doc = true;
            continue;
        }
        if in_doc {
            doc_lines.push(line);
            continue;
        }
        if info.signature.is_some() {
            continue;
        }
        if line.contains('(') && line.contains(')') {
            info.signature = Some(line.to_string());
            info.return_type = line
                .rsplit_once(" -> ")
                .or_else(|| line.rsplit_once("): "))
                .map(|(_, ret)| ret.trim().to_string())
                .filter(|ret| !ret.is_empty());
        } else if line.contains(':') && !line.starts_with('#') {
            info.signature = Some(line.to_string());
        }
    }

    let doc = doc_lines.join("\n").trim().to_string();
    if !doc.is_empty() {
        info.docstring = Some(doc);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_hover() {
        let info = parse_hover("```python\ndef foo(x: int) -> str\n```\n---\nDoes foo.\nTwice.");
        assert_eq!(info.signature.as_deref(), Some("def foo(x: int) -> str"));
        assert_eq!(info.return_type.as_deref(), Some("str"));
        assert_eq!(info.docstring.as_deref(), Some("Does foo.\nTwice."));
    }

    #[test]
    fn typescript_hover() {
        let info = parse_hover("```typescript\n(method) Shape.area(scale: number): number\n```");
        assert_eq!(info.return_type.as_deref(), Some("number"));
        assert_eq!(info.docstring, None);
    }

    #[test]
    fn go_hover_has_no_arrow() {
        let info = parse_hover("func (r *Repo) Load(id int) error");
        assert_eq!(info.signature.as_deref(), Some("func (r *Repo) Load(id int) error"));
        assert_eq!(info.return_type, None);
    }

    #[test]
    fn variable_annotation_as_signature() {
        let info = parse_hover("```python\n(variable) count: int\n```");
        // parentheses in the kind tag count as a call signature
        assert_eq!(info.signature.as_deref(), Some("(variable) count: int"));
        let plain = parse_hover("count: int");
        assert_eq!(plain.signature.as_deref(), Some("count: int"));
    }

    #[test]
    fn empty_hover() {
        assert_eq!(parse_hover(""), HoverInfo::default());
    }
}
