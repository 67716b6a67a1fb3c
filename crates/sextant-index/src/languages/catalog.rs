//! Built-in language table.

use super::{GrammarFn, LanguageConfig, QueryPattern, QuerySet};

#[cfg(feature = "lang-rust")]
fn rust_grammar() -> tree_sitter::Language {
    tree_sitter_rust::LANGUAGE.into()
}

#[cfg(feature = "lang-python")]
fn python_grammar() -> tree_sitter::Language {
    tree_sitter_python::LANGUAGE.into()
}

#[cfg(feature = "lang-js")]
fn javascript_grammar() -> tree_sitter::Language {
    tree_sitter_javascript::LANGUAGE.into()
}

#[cfg(feature = "lang-js")]
fn typescript_grammar() -> tree_sitter::Language {
    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
}

#[cfg(feature = "lang-js")]
fn tsx_grammar() -> tree_sitter::Language {
    tree_sitter_typescript::LANGUAGE_TSX.into()
}

#[cfg(feature = "lang-go")]
fn go_grammar() -> tree_sitter::Language {
    tree_sitter_go::LANGUAGE.into()
}

#[cfg(feature = "lang-config")]
fn bash_grammar() -> tree_sitter::Language {
    tree_sitter_bash::LANGUAGE.into()
}

#[cfg(feature = "lang-config")]
fn toml_grammar() -> tree_sitter::Language {
    tree_sitter_toml_ng::LANGUAGE.into()
}

#[cfg(feature = "lang-config")]
fn json_grammar() -> tree_sitter::Language {
    tree_sitter_json::LANGUAGE.into()
}

#[cfg(feature = "lang-config")]
fn markdown_grammar() -> tree_sitter::Language {
    tree_sitter_md::LANGUAGE.into()
}

macro_rules! grammar {
    ($feature:literal, $f:ident) => {{
        #[cfg(feature = $feature)]
        let g: Option<GrammarFn> = Some($f);
        #[cfg(not(feature = $feature))]
        let g: Option<GrammarFn> = None;
        g
    }};
}

fn kinds(kinds: &[&str]) -> Vec<String> {
    kinds.iter().map(|k| (*k).to_string()).collect()
}

fn scopes(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(kind, field)| ((*kind).to_string(), (*field).to_string()))
        .collect()
}

fn python() -> LanguageConfig {
    LanguageConfig::new("python", "Python")
        .with_aliases(&["py", "python3", "python2"])
        .with_extensions(&[".py", ".pyw", ".pyi"])
        .with_filenames(&["SConstruct", "SConscript"])
        .with_shebangs(&["python", "python3", "python2"])
        .with_line_comment("#")
        .with_block_comment("\"\"\"", "\"\"\"")
        .with_language_server("pyright")
        .with_grammar(grammar!("lang-python", python_grammar))
        .with_import_patterns(&[
            r"^\s*from\s+([\w.]+)\s+import\s",
            r"^\s*import\s+([\w.]+)",
        ])
        .with_queries(QuerySet {
            symbols: vec![
                QueryPattern::new("class", "(class_definition name: (identifier) @name) @def"),
                QueryPattern::new(
                    "function",
                    "(function_definition name: (identifier) @name) @def",
                ),
            ],
            calls: Some(
                "(call function: (identifier) @callee)
                 (call function: (attribute attribute: (identifier) @callee))"
                    .into(),
            ),
            references: Some(
                "(call function: (identifier) @name)
                 (attribute attribute: (identifier) @name)
                 (identifier) @name"
                    .into(),
            ),
            inheritance: Some(
                "(class_definition
                    name: (identifier) @child
                    superclasses: (argument_list (identifier) @base))"
                    .into(),
            ),
            implements: None,
            composition: Some(
                "(class_definition
                    name: (identifier) @owner
                    body: (block
                        (function_definition
                            name: (identifier) @_init (#eq? @_init \"__init__\")
                            body: (block
                                (expression_statement
                                    (assignment
                                        left: (attribute object: (identifier) @_self (#eq? @_self \"self\"))
                                        right: (call function: (identifier) @type)))))))"
                    .into(),
            ),
            imports: Some(
                "(import_statement name: (dotted_name) @import)
                 (import_from_statement module_name: (dotted_name) @import)"
                    .into(),
            ),
            enclosing_scopes: scopes(&[
                ("function_definition", "name"),
                ("class_definition", "name"),
            ]),
            class_scopes: kinds(&["class_definition"]),
        })
}

fn rust() -> LanguageConfig {
    LanguageConfig::new("rust", "Rust")
        .with_aliases(&["rs"])
        .with_extensions(&[".rs"])
        .with_shebangs(&["rust-script"])
        .with_line_comment("//")
        .with_block_comment("/*", "*/")
        .with_language_server("rust-analyzer")
        .with_grammar(grammar!("lang-rust", rust_grammar))
        .with_import_patterns(&[r"^\s*(?:pub\s+)?use\s+([\w:]+)"])
        .with_queries(QuerySet {
            symbols: vec![
                QueryPattern::new("struct", "(struct_item name: (type_identifier) @name) @def"),
                QueryPattern::new("enum", "(enum_item name: (type_identifier) @name) @def"),
                QueryPattern::new("trait", "(trait_item name: (type_identifier) @name) @def"),
                QueryPattern::new("function", "(function_item name: (identifier) @name) @def"),
                QueryPattern::new("type", "(type_item name: (type_identifier) @name) @def"),
                QueryPattern::new("module", "(mod_item name: (identifier) @name) @def"),
                QueryPattern::new(
                    "macro",
                    "(macro_definition name: (identifier) @name) @def",
                ),
            ],
            calls: Some(
                "(call_expression function: (identifier) @callee)
                 (call_expression function: (field_expression field: (field_identifier) @callee))
                 (call_expression function: (scoped_identifier name: (identifier) @callee))"
                    .into(),
            ),
            references: Some(
                "(call_expression function: (identifier) @name)
                 (field_expression field: (field_identifier) @name)
                 (identifier) @name
                 (type_identifier) @name"
                    .into(),
            ),
            inheritance: None,
            implements: Some(
                "(impl_item
                    trait: (type_identifier) @interface
                    type: (type_identifier) @child)"
                    .into(),
            ),
            composition: Some(
                "(struct_item
                    name: (type_identifier) @owner
                    body: (field_declaration_list
                        (field_declaration
                            type: (type_identifier) @type)))"
                    .into(),
            ),
            imports: Some("(use_declaration argument: (_) @import)".into()),
            enclosing_scopes: scopes(&[
                ("function_item", "name"),
                ("impl_item", "type"),
                ("trait_item", "name"),
            ]),
            class_scopes: kinds(&["struct_item", "impl_item", "trait_item"]),
        })
}

fn go() -> LanguageConfig {
    LanguageConfig::new("go", "Go")
        .with_aliases(&["golang"])
        .with_extensions(&[".go"])
        .with_filenames(&["go.mod"])
        .with_line_comment("//")
        .with_block_comment("/*", "*/")
        .with_language_server("gopls")
        .with_grammar(grammar!("lang-go", go_grammar))
        .with_import_patterns(&[r#"^\s*import\s+(?:\w+\s+)?"([^"]+)""#, r#"^\s+"([^"]+)"$"#])
        .with_queries(QuerySet {
            symbols: vec![
                QueryPattern::new(
                    "function",
                    "(function_declaration name: (identifier) @name) @def",
                ),
                QueryPattern::new(
                    "method",
                    "(method_declaration name: (field_identifier) @name) @def",
                ),
                QueryPattern::new(
                    "struct",
                    "(type_declaration (type_spec name: (type_identifier) @name type: (struct_type))) @def",
                ),
                QueryPattern::new(
                    "interface",
                    "(type_declaration (type_spec name: (type_identifier) @name type: (interface_type))) @def",
                ),
            ],
            calls: Some(
                "(call_expression function: (identifier) @callee)
                 (call_expression function: (selector_expression field: (field_identifier) @callee))"
                    .into(),
            ),
            references: Some(
                "(selector_expression field: (field_identifier) @name)
                 (identifier) @name
                 (type_identifier) @name"
                    .into(),
            ),
            inheritance: None,
            implements: None,
            composition: Some(
                "(type_declaration
                    (type_spec
                        name: (type_identifier) @owner
                        type: (struct_type
                            (field_declaration_list
                                (field_declaration
                                    type: (type_identifier) @type)))))"
                    .into(),
            ),
            imports: Some("(import_spec path: (interpreted_string_literal) @import)".into()),
            enclosing_scopes: scopes(&[
                ("function_declaration", "name"),
                ("method_declaration", "name"),
            ]),
            class_scopes: kinds(&["type_declaration"]),
        })
}

fn js_symbols(class_name_node: &str) -> Vec<QueryPattern> {
    vec![
        QueryPattern::new(
            "class",
            format!("(class_declaration name: ({class_name_node}) @name) @def"),
        ),
        QueryPattern::new(
            "function",
            "(function_declaration name: (identifier) @name) @def",
        ),
        QueryPattern::new(
            "method",
            "(method_definition name: (property_identifier) @name) @def",
        ),
        QueryPattern::new(
            "function",
            "(lexical_declaration (variable_declarator name: (identifier) @name value: (arrow_function))) @def",
        ),
        QueryPattern::new(
            "function",
            "(lexical_declaration (variable_declarator name: (identifier) @name value: (function_expression))) @def",
        ),
    ]
}

const JS_CALLS: &str = "(call_expression function: (identifier) @callee)
 (call_expression function: (member_expression property: (property_identifier) @callee))
 (new_expression constructor: (identifier) @callee)";

const JS_REFERENCES: &str = "(member_expression property: (property_identifier) @name)
 (identifier) @name";

const JS_IMPORTS: &str = "(import_statement source: (string) @import)";

const JS_IMPORT_PATTERNS: &[&str] = &[
    r#"^\s*import\s+.*?from\s+['"]([^'"]+)['"]"#,
    r#"^\s*import\s+['"]([^'"]+)['"]"#,
    r#"require\(\s*['"]([^'"]+)['"]\s*\)"#,
];

fn javascript() -> LanguageConfig {
    LanguageConfig::new("javascript", "JavaScript")
        .with_aliases(&["js", "node"])
        .with_extensions(&[".js", ".mjs", ".cjs", ".jsx"])
        .with_shebangs(&["node", "nodejs"])
        .with_line_comment("//")
        .with_block_comment("/*", "*/")
        .with_language_server("typescript-language-server")
        .with_grammar(grammar!("lang-js", javascript_grammar))
        .with_import_patterns(JS_IMPORT_PATTERNS)
        .with_queries(QuerySet {
            symbols: js_symbols("identifier"),
            calls: Some(JS_CALLS.into()),
            references: Some(JS_REFERENCES.into()),
            inheritance: Some(
                "(class_declaration
                    name: (identifier) @child
                    (class_heritage (identifier) @base))"
                    .into(),
            ),
            implements: None,
            composition: Some(
                "(class_declaration
                    name: (identifier) @owner
                    body: (class_body
                        (method_definition
                            body: (statement_block
                                (expression_statement
                                    (assignment_expression
                                        left: (member_expression object: (this))
                                        right: (new_expression constructor: (identifier) @type)))))))"
                    .into(),
            ),
            imports: Some(JS_IMPORTS.into()),
            enclosing_scopes: scopes(&[
                ("function_declaration", "name"),
                ("method_definition", "name"),
                ("class_declaration", "name"),
            ]),
            class_scopes: kinds(&["class_declaration"]),
        })
}

fn typescript_queries() -> QuerySet {
    let mut symbols = js_symbols("type_identifier");
    symbols.push(QueryPattern::new(
        "interface",
        "(interface_declaration name: (type_identifier) @name) @def",
    ));
    symbols.push(QueryPattern::new(
        "class",
        "(abstract_class_declaration name: (type_identifier) @name) @def",
    ));
    symbols.push(QueryPattern::new(
        "enum",
        "(enum_declaration name: (identifier) @name) @def",
    ));
    QuerySet {
        symbols,
        calls: Some(JS_CALLS.into()),
        references: Some(
            "(member_expression property: (property_identifier) @name)
             (identifier) @name
             (type_identifier) @name"
                .into(),
        ),
        inheritance: Some(
            "(class_declaration
                name: (type_identifier) @child
                (class_heritage (extends_clause value: (identifier) @base)))"
                .into(),
        ),
        implements: Some(
            "(class_declaration
                name: (type_identifier) @child
                (class_heritage (implements_clause (type_identifier) @interface)))"
                .into(),
        ),
        composition: Some(
            "(class_declaration
                name: (type_identifier) @owner
                body: (class_body
                    (public_field_definition
                        type: (type_annotation (type_identifier) @type))))"
                .into(),
        ),
        imports: Some(JS_IMPORTS.into()),
        enclosing_scopes: scopes(&[
            ("function_declaration", "name"),
            ("method_definition", "name"),
            ("class_declaration", "name"),
            ("abstract_class_declaration", "name"),
            ("interface_declaration", "name"),
        ]),
        class_scopes: kinds(&[
            "class_declaration",
            "abstract_class_declaration",
            "interface_declaration",
        ]),
    }
}

fn typescript() -> LanguageConfig {
    LanguageConfig::new("typescript", "TypeScript")
        .with_aliases(&["ts"])
        .with_extensions(&[".ts", ".mts", ".cts"])
        .with_shebangs(&["ts-node", "deno"])
        .with_line_comment("//")
        .with_block_comment("/*", "*/")
        .with_language_server("typescript-language-server")
        .with_grammar(grammar!("lang-js", typescript_grammar))
        .with_import_patterns(JS_IMPORT_PATTERNS)
        .with_queries(typescript_queries())
}

fn tsx() -> LanguageConfig {
    LanguageConfig::new("tsx", "TSX")
        .with_extensions(&[".tsx"])
        .with_line_comment("//")
        .with_block_comment("/*", "*/")
        .with_language_server("typescript-language-server")
        .with_grammar(grammar!("lang-js", tsx_grammar))
        .with_import_patterns(JS_IMPORT_PATTERNS)
        .with_queries(typescript_queries())
}

fn bash() -> LanguageConfig {
    LanguageConfig::new("bash", "Bash")
        .with_aliases(&["sh", "shell", "zsh"])
        .with_extensions(&[".sh", ".bash", ".zsh", ".ksh"])
        .with_filenames(&[".bashrc", ".zshrc", ".profile", ".bash_profile"])
        .with_shebangs(&["bash", "sh", "zsh"])
        .with_line_comment("#")
        .with_language_server("bash-language-server")
        .with_grammar(grammar!("lang-config", bash_grammar))
        .with_import_patterns(&[r"^\s*(?:source|\.)\s+(\S+)"])
        .with_queries(QuerySet {
            symbols: vec![QueryPattern::new(
                "function",
                "(function_definition name: (word) @name) @def",
            )],
            calls: Some("(command name: (command_name (word) @callee))".into()),
            references: Some("(variable_name) @name".into()),
            enclosing_scopes: scopes(&[("function_definition", "name")]),
            ..QuerySet::default()
        })
}

fn toml() -> LanguageConfig {
    LanguageConfig::new("toml", "TOML")
        .with_extensions(&[".toml"])
        .with_filenames(&["Cargo.lock", "Pipfile"])
        .with_line_comment("#")
        .with_grammar(grammar!("lang-config", toml_grammar))
        .as_config_language()
}

fn json() -> LanguageConfig {
    LanguageConfig::new("json", "JSON")
        .with_extensions(&[".json", ".jsonc"])
        .with_filenames(&[".eslintrc", ".babelrc"])
        .with_grammar(grammar!("lang-config", json_grammar))
        .as_config_language()
}

fn markdown() -> LanguageConfig {
    LanguageConfig::new("markdown", "Markdown")
        .with_aliases(&["md"])
        .with_extensions(&[".md", ".markdown"])
        .with_grammar(grammar!("lang-config", markdown_grammar))
}

fn yaml() -> LanguageConfig {
    LanguageConfig::new("yaml", "YAML")
        .with_aliases(&["yml"])
        .with_extensions(&[".yaml", ".yml"])
        .with_line_comment("#")
        .as_config_language()
}

/// Languages recognised for detection and regex fallback only.
fn detection_only() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig::new("java", "Java")
            .with_extensions(&[".java"])
            .with_line_comment("//")
            .with_language_server("jdtls")
            .with_import_patterns(&[r"^\s*import\s+(?:static\s+)?([\w.*]+)\s*;"]),
        LanguageConfig::new("c", "C")
            .with_extensions(&[".c", ".h"])
            .with_line_comment("//")
            .with_language_server("clangd")
            .with_import_patterns(&[r#"^\s*#include\s+[<"]([^>"]+)[>"]"#]),
        LanguageConfig::new("cpp", "C++")
            .with_aliases(&["c++", "cxx"])
            .with_extensions(&[".cpp", ".cc", ".cxx", ".hpp", ".hh", ".hxx"])
            .with_line_comment("//")
            .with_language_server("clangd")
            .with_import_patterns(&[r#"^\s*#include\s+[<"]([^>"]+)[>"]"#]),
        LanguageConfig::new("ruby", "Ruby")
            .with_aliases(&["rb"])
            .with_extensions(&[".rb", ".rake"])
            .with_filenames(&["Rakefile", "Gemfile"])
            .with_shebangs(&["ruby"])
            .with_line_comment("#")
            .with_import_patterns(&[r#"^\s*require(?:_relative)?\s+['"]([^'"]+)['"]"#]),
        LanguageConfig::new("php", "PHP")
            .with_extensions(&[".php"])
            .with_shebangs(&["php"])
            .with_line_comment("//")
            .with_import_patterns(&[r"^\s*use\s+([\w\\]+)\s*;"]),
        LanguageConfig::new("csharp", "C#")
            .with_aliases(&["cs", "c#"])
            .with_extensions(&[".cs"])
            .with_line_comment("//")
            .with_import_patterns(&[r"^\s*using\s+([\w.]+)\s*;"]),
        LanguageConfig::new("kotlin", "Kotlin")
            .with_aliases(&["kt"])
            .with_extensions(&[".kt", ".kts"])
            .with_line_comment("//")
            .with_import_patterns(&[r"^\s*import\s+([\w.*]+)"]),
        LanguageConfig::new("swift", "Swift")
            .with_extensions(&[".swift"])
            .with_line_comment("//")
            .with_import_patterns(&[r"^\s*import\s+(\w+)"]),
        LanguageConfig::new("scala", "Scala")
            .with_extensions(&[".scala", ".sc"])
            .with_line_comment("//")
            .with_import_patterns(&[r"^\s*import\s+([\w.{}, ]+)"]),
        LanguageConfig::new("lua", "Lua")
            .with_extensions(&[".lua"])
            .with_shebangs(&["lua"])
            .with_line_comment("--")
            .with_import_patterns(&[r#"require\s*\(?\s*['"]([^'"]+)['"]"#]),
        LanguageConfig::new("sql", "SQL")
            .with_extensions(&[".sql"])
            .with_line_comment("--"),
        LanguageConfig::new("html", "HTML").with_extensions(&[".html", ".htm"]),
        LanguageConfig::new("css", "CSS").with_extensions(&[".css", ".scss", ".less"]),
        yaml(),
    ]
}

/// All built-in languages in registration order.
///
/// Order matters for content detection ties: earlier entries win.
pub(crate) fn builtin_languages() -> Vec<LanguageConfig> {
    let mut langs = vec![
        python(),
        rust(),
        go(),
        javascript(),
        typescript(),
        tsx(),
        bash(),
        toml(),
        json(),
        markdown(),
    ];
    langs.extend(detection_only());
    langs
}
