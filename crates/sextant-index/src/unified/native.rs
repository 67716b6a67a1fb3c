//! Python enrichment from the full syntax tree.
//!
//! Reads what the symbol queries leave out: annotations, parameters,
//! decorators, `async`, docstrings and underscore visibility.

use std::collections::HashMap;

use tree_sitter::{Node, Tree};

/// Canonical name of the one language this pass understands.
pub const LANGUAGE: &str = "python";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeInfo {
    pub return_type: Option<String>,
    pub parameters: Vec<String>,
    pub is_async: bool,
    pub decorators: Vec<String>,
    pub docstring: Option<String>,
    pub visibility: &'static str,
}

/// Definitions keyed by `(name, 1-based line of the def/class keyword)`.
#[must_use]
pub fn collect(tree: &Tree, source: &str) -> HashMap<(String, usize), NativeInfo> {
    let bytes = source.as_bytes();
    let mut out = HashMap::new();
    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        if matches!(node.kind(), "function_definition" | "class_definition")
            && let Some(name) = node.child_by_field_name("name").and_then(|n| text(n, bytes))
        {
            let line = node.start_position().row + 1;
            let info = describe(node, &name, bytes);
            out.insert((name, line), info);
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
    out
}

fn describe(node: Node<'_>, name: &str, bytes: &[u8]) -> NativeInfo {
    let is_function = node.kind() == "function_definition";
    let mut cursor = node.walk();
    let is_async = is_function && node.children(&mut cursor).any(|c| c.kind() == "async");
    NativeInfo {
        return_type: node
            .child_by_field_name("return_type")
            .and_then(|n| text(n, bytes)),
        parameters: if is_function {
            node.child_by_field_name("parameters")
                .map(|p| parameters(p, bytes))
                .unwrap_or_default()
        } else {
            Vec::new()
        },
        is_async,
        decorators: decorators(node, bytes),
        docstring: docstring(node, bytes),
        visibility: visibility(name),
    }
}

fn text(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    node.utf8_text(bytes).ok().map(str::to_string)
}

fn parameters(params: Node<'_>, bytes: &[u8]) -> Vec<String> {
    let mut cursor = params.walk();
    params
        .named_children(&mut cursor)
        .filter_map(|p| match p.kind() {
            "default_parameter" => p.child_by_field_name("name").and_then(|n| text(n, bytes)),
            "typed_default_parameter" => {
                let name = p.child_by_field_name("name").and_then(|n| text(n, bytes))?;
                match p.child_by_field_name("type").and_then(|n| text(n, bytes)) {
                    Some(ty) => Some(format!("{name}: {ty}")),
                    None => Some(name),
                }
            }
            "comment" => None,
            _ => text(p, bytes),
        })
        .filter(|p| p != "self" && p != "cls")
        .collect()
}

fn decorators(node: Node<'_>, bytes: &[u8]) -> Vec<String> {
    let Some(parent) = node.parent().filter(|p| p.kind() == "decorated_definition") else {
        return Vec::new();
    };
    let mut cursor = parent.walk();
    parent
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "decorator")
        .filter_map(|c| text(c, bytes))
        .map(|d| d.trim_start_matches('@').trim().to_string())
        .collect()
}

fn docstring(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).find(|c| c.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0).filter(|s| s.kind() == "string")?;
    let raw = text(string, bytes)?;
    let doc = strip_quotes(&raw).trim().to_string();
    (!doc.is_empty()).then_some(doc)
}

fn strip_quotes(raw: &str) -> &str {
    let body = raw.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    body
}

fn visibility(name: &str) -> &'static str {
    if name.starts_with("__") && name.ends_with("__") {
        "public"
    } else if name.starts_with('_') {
        "private"
    } else {
        "public"
    }
}
