//! Extraction tiers: which enrichment stages exist for a language.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Language classification by available extraction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LanguageTier {
    /// Structural parser, native AST and/or language server.
    Tier1,
    /// Structural parser plus language server.
    Tier2,
    /// Structural parser only.
    Tier3,
}

impl LanguageTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
        }
    }
}

impl std::fmt::Display for LanguageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierConfig {
    pub tier: LanguageTier,
    pub has_structural_parser: bool,
    pub has_native_ast: bool,
    pub has_external_language_server: bool,
    /// Output quality depends on language-server enrichment.
    pub enrichment_required: bool,
}

impl TierConfig {
    const fn parser_only() -> Self {
        Self {
            tier: LanguageTier::Tier3,
            has_structural_parser: true,
            has_native_ast: false,
            has_external_language_server: false,
            enrichment_required: false,
        }
    }

    const fn with_server(tier: LanguageTier) -> Self {
        Self {
            tier,
            has_structural_parser: true,
            has_native_ast: false,
            has_external_language_server: true,
            enrichment_required: false,
        }
    }

    /// Whether a language server is worth starting for this language.
    #[must_use]
    pub fn is_lsp_recommended(&self) -> bool {
        self.has_external_language_server
            && matches!(self.tier, LanguageTier::Tier1 | LanguageTier::Tier2)
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::parser_only()
    }
}

const TIER1_NATIVE: &[&str] = &["python"];
const TIER1_SERVER: &[&str] = &["typescript", "javascript", "tsx", "jsx"];
const TIER2: &[&str] = &["go", "rust", "java", "c", "cpp"];
const TIER3: &[&str] = &[
    "ruby", "php", "csharp", "swift", "kotlin", "scala", "lua", "perl", "r", "julia", "elixir",
    "haskell", "ocaml", "bash", "sql", "yaml", "json", "toml", "html", "css", "markdown", "vue",
    "svelte", "zig", "nim", "dart", "clojure", "erlang", "terraform", "dockerfile", "make",
];
const ALIASES: &[(&str, &str)] = &[
    ("py", "python"),
    ("python3", "python"),
    ("ts", "typescript"),
    ("js", "javascript"),
    ("golang", "go"),
    ("rs", "rust"),
    ("c++", "cpp"),
    ("cs", "csharp"),
    ("c#", "csharp"),
    ("sh", "bash"),
    ("shell", "bash"),
    ("zsh", "bash"),
    ("yml", "yaml"),
    ("md", "markdown"),
    ("rb", "ruby"),
    ("kt", "kotlin"),
];

/// Immutable tier assignments keyed by canonical lowercase language name.
///
/// Unknown languages resolve to parser-only, so a new grammar works without
/// touching this table.
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: HashMap<String, TierConfig>,
    aliases: HashMap<String, String>,
}

impl TierTable {
    #[must_use]
    pub fn builtin() -> Self {
        let mut tiers = HashMap::new();
        for name in TIER1_NATIVE {
            tiers.insert(
                (*name).to_string(),
                TierConfig {
                    tier: LanguageTier::Tier1,
                    has_structural_parser: true,
                    has_native_ast: true,
                    has_external_language_server: true,
                    enrichment_required: false,
                },
            );
        }
        for name in TIER1_SERVER {
            tiers.insert(
                (*name).to_string(),
                TierConfig {
                    enrichment_required: true,
                    ..TierConfig::with_server(LanguageTier::Tier1)
                },
            );
        }
        for name in TIER2 {
            tiers.insert(
                (*name).to_string(),
                TierConfig::with_server(LanguageTier::Tier2),
            );
        }
        for name in TIER3 {
            tiers.insert((*name).to_string(), TierConfig::parser_only());
        }
        let aliases = ALIASES
            .iter()
            .map(|(a, c)| ((*a).to_string(), (*c).to_string()))
            .collect();
        Self { tiers, aliases }
    }

    fn canonical(&self, name: &str) -> String {
        let lower = name.to_lowercase();
        self.aliases.get(&lower).cloned().unwrap_or(lower)
    }

    /// Tier for `name` (alias-aware). Unknown names get parser-only.
    #[must_use]
    pub fn get(&self, name: &str) -> TierConfig {
        self.tiers
            .get(&self.canonical(name))
            .copied()
            .unwrap_or_default()
    }

    /// Whether `name` has an explicit entry, as opposed to the default.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tiers.contains_key(&self.canonical(name))
    }

    /// Sorted language names assigned to `tier`.
    #[must_use]
    pub fn languages_by_tier(&self, tier: LanguageTier) -> Vec<String> {
        let mut names: Vec<String> = self
            .tiers
            .iter()
            .filter(|(_, cfg)| cfg.tier == tier)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn is_lsp_recommended(&self, name: &str) -> bool {
        self.get(name).is_lsp_recommended()
    }

    /// Number of languages per tier.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<LanguageTier, usize> {
        let mut out = BTreeMap::new();
        for cfg in self.tiers.values() {
            *out.entry(cfg.tier).or_insert(0) += 1;
        }
        out
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_has_native_ast() {
        let table = TierTable::builtin();
        let cfg = table.get("python");
        assert_eq!(cfg.tier, LanguageTier::Tier1);
        assert!(cfg.has_native_ast);
        assert!(!cfg.enrichment_required);
    }

    #[test]
    fn typescript_requires_enrichment() {
        let cfg = TierTable::builtin().get("TypeScript");
        assert_eq!(cfg.tier, LanguageTier::Tier1);
        assert!(cfg.enrichment_required);
        assert!(!cfg.has_native_ast);
    }

    #[test]
    fn alias_resolves() {
        let table = TierTable::builtin();
        assert_eq!(table.get("golang").tier, LanguageTier::Tier2);
        assert_eq!(table.get("py"), table.get("python"));
        assert!(table.contains("rs"));
    }

    #[test]
    fn unknown_language_is_parser_only() {
        let table = TierTable::builtin();
        let cfg = table.get("brainfuck");
        assert_eq!(cfg, TierConfig::default());
        assert!(cfg.has_structural_parser);
        assert!(!table.contains("brainfuck"));
    }

    #[test]
    fn lsp_recommended_only_for_upper_tiers() {
        let table = TierTable::builtin();
        assert!(table.is_lsp_recommended("rust"));
        assert!(table.is_lsp_recommended("python"));
        assert!(!table.is_lsp_recommended("bash"));
    }

    #[test]
    fn languages_by_tier_sorted() {
        let tier2 = TierTable::builtin().languages_by_tier(LanguageTier::Tier2);
        assert_eq!(tier2, vec!["c", "cpp", "go", "java", "rust"]);
    }

    #[test]
    fn summary_counts_every_entry() {
        let table = TierTable::builtin();
        let summary = table.summary();
        assert_eq!(summary[&LanguageTier::Tier1], 5);
        assert_eq!(summary[&LanguageTier::Tier2], 5);
        assert_eq!(summary.values().sum::<usize>(), 10 + TIER3.len());
    }
}
