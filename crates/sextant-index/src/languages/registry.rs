//! Explicit language registry: name, alias and extension lookup plus detection.

use std::collections::HashMap;
use std::path::Path;

use super::catalog::builtin_languages;
use super::tiers::{TierConfig, TierTable};
use super::{LanguageConfig, normalize_extension, path_extension};
use crate::error::{IndexError, Result};

/// Minimum content-detection confidence accepted by [`LanguageRegistry::detect_from_content`].
pub const MIN_DETECTION_CONFIDENCE: f32 = 0.3;

/// Result of content-based detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub language: String,
    pub confidence: f32,
}

/// Owns every registered [`LanguageConfig`] and the tier table.
///
/// Built once at startup and passed by reference (or `Arc`) to every
/// component; there is no process-global registry.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    /// Registration order, used to break detection ties.
    plugins: Vec<LanguageConfig>,
    names: HashMap<String, usize>,
    extensions: HashMap<String, usize>,
    tiers: TierTable,
}

impl LanguageRegistry {
    /// Empty registry with the built-in tier table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            names: HashMap::new(),
            extensions: HashMap::new(),
            tiers: TierTable::builtin(),
        }
    }

    /// Registry preloaded with every built-in language.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for lang in builtin_languages() {
            registry.register(lang, &[], &[]);
        }
        registry
    }

    /// Register (or replace) a language. Extra extensions and aliases are
    /// merged into the config before indexing.
    ///
    /// A replacement keeps the original's place in registration order.
    pub fn register(&mut self, mut config: LanguageConfig, extensions: &[&str], aliases: &[&str]) {
        config.name = config.name.to_lowercase();
        for ext in extensions {
            let ext = normalize_extension(ext);
            if !config.extensions.contains(&ext) {
                config.extensions.push(ext);
            }
        }
        for alias in aliases {
            let alias = alias.to_lowercase();
            if !config.aliases.contains(&alias) {
                config.aliases.push(alias);
            }
        }

        if let Some(idx) = self.plugins.iter().position(|l| l.name == config.name) {
            tracing::debug!(language = %config.name, "replacing registered language");
            self.plugins[idx] = config;
            self.rebuild_indexes();
            return;
        }

        let idx = self.plugins.len();
        self.names.insert(config.name.clone(), idx);
        for alias in &config.aliases {
            self.names.entry(alias.clone()).or_insert(idx);
        }
        for ext in &config.extensions {
            self.extensions.entry(ext.clone()).or_insert(idx);
        }
        self.plugins.push(config);
    }

    /// Remove a language by canonical name or alias. Returns whether it existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let Some(&idx) = self.names.get(&name.to_lowercase()) else {
            return false;
        };
        self.plugins.remove(idx);
        self.rebuild_indexes();
        true
    }

    fn rebuild_indexes(&mut self) {
        self.names.clear();
        self.extensions.clear();
        for (idx, lang) in self.plugins.iter().enumerate() {
            self.names.insert(lang.name.clone(), idx);
        }
        for (idx, lang) in self.plugins.iter().enumerate() {
            for alias in &lang.aliases {
                self.names.entry(alias.clone()).or_insert(idx);
            }
            for ext in &lang.extensions {
                self.extensions.entry(ext.clone()).or_insert(idx);
            }
        }
    }

    /// Look up a language by name or alias.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnknownLanguage`] listing every registered name.
    pub fn get(&self, name: &str) -> Result<&LanguageConfig> {
        self.lookup(name)
            .ok_or_else(|| IndexError::UnknownLanguage {
                name: name.to_string(),
                available: self.list_languages().join(", "),
            })
    }

    /// Non-failing variant of [`Self::get`].
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&LanguageConfig> {
        self.names
            .get(&name.to_lowercase())
            .map(|&idx| &self.plugins[idx])
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.names.contains_key(&name.to_lowercase())
    }

    /// Sorted canonical names.
    #[must_use]
    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.iter().map(|l| l.name.clone()).collect();
        names.sort();
        names
    }

    /// Sorted registered extensions.
    #[must_use]
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.extensions.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Registered languages in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &LanguageConfig> {
        self.plugins.iter()
    }

    /// Detect the language of a file on disk.
    ///
    /// Order: exact extension, exact filename, then a shebang on the first
    /// line (only read when the cheaper checks fail).
    #[must_use]
    pub fn detect_language(&self, path: &Path) -> Option<&LanguageConfig> {
        if let Some(ext) = path_extension(path)
            && let Some(&idx) = self.extensions.get(&ext)
        {
            return Some(&self.plugins[idx]);
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && let Some(lang) = self
                .plugins
                .iter()
                .find(|l| l.filenames.iter().any(|f| f == name))
        {
            return Some(lang);
        }
        self.plugins.iter().find(|l| l.matches_path(path))
    }

    /// Detect a language from in-memory content with an optional filename hint.
    ///
    /// A known extension on `filename` wins outright. Otherwise each plugin
    /// scores the content and the first strictly-best score at or above
    /// [`MIN_DETECTION_CONFIDENCE`] is returned.
    #[must_use]
    pub fn detect_from_content(&self, content: &str, filename: Option<&str>) -> Option<Detection> {
        if let Some(filename) = filename
            && let Some(ext) = path_extension(Path::new(filename))
            && let Some(&idx) = self.extensions.get(&ext)
        {
            return Some(Detection {
                language: self.plugins[idx].name.clone(),
                confidence: 1.0,
            });
        }

        let mut best: Option<(&LanguageConfig, f32)> = None;
        for lang in &self.plugins {
            let score = lang.content_score(content, filename);
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((lang, score));
            }
        }

        best.filter(|(_, score)| *score >= MIN_DETECTION_CONFIDENCE)
            .map(|(lang, confidence)| Detection {
                language: lang.name.clone(),
                confidence,
            })
    }

    /// Tier configuration, resolving registry aliases first.
    #[must_use]
    pub fn tier(&self, name: &str) -> TierConfig {
        let canonical = self.lookup(name).map_or(name, |l| l.name.as_str());
        self.tiers.get(canonical)
    }

    #[must_use]
    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    #[must_use]
    pub fn is_config_language(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|l| l.config_language)
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::LanguageTier;

    #[test]
    fn get_by_name_and_alias() {
        let reg = LanguageRegistry::with_builtins();
        assert_eq!(reg.get("python").unwrap().name, "python");
        assert_eq!(reg.get("PY").unwrap().name, "python");
        assert_eq!(reg.get("golang").unwrap().name, "go");
    }

    #[test]
    fn get_unknown_lists_available() {
        let reg = LanguageRegistry::with_builtins();
        let err = reg.get("cobol").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cobol"));
        assert!(msg.contains("Available:"));
        assert!(msg.contains("python"));
    }

    #[test]
    fn list_languages_sorted() {
        let reg = LanguageRegistry::with_builtins();
        let names = reg.list_languages();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"rust".to_string()));
    }

    #[test]
    fn detect_main_go_by_extension() {
        let reg = LanguageRegistry::with_builtins();
        let lang = reg.detect_language(Path::new("cmd/main.go")).unwrap();
        assert_eq!(lang.name, "go");
    }

    #[test]
    fn detect_by_filename() {
        let reg = LanguageRegistry::with_builtins();
        assert_eq!(
            reg.detect_language(Path::new("home/.bashrc")).unwrap().name,
            "bash"
        );
        assert_eq!(
            reg.detect_language(Path::new("Gemfile")).unwrap().name,
            "ruby"
        );
    }

    #[test]
    fn detect_shebang_file_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, "#!/usr/bin/env python3\nprint(1)\n").unwrap();
        let reg = LanguageRegistry::with_builtins();
        assert_eq!(reg.detect_language(&path).unwrap().name, "python");
    }

    #[test]
    fn detect_unknown_returns_none() {
        let reg = LanguageRegistry::with_builtins();
        assert!(reg.detect_language(Path::new("notes.xyz")).is_none());
    }

    #[test]
    fn content_shebang_overrides_txt_extension() {
        let reg = LanguageRegistry::with_builtins();
        let det = reg
            .detect_from_content("#!/usr/bin/env bash\necho hi\n", Some("script.txt"))
            .unwrap();
        assert_eq!(det.language, "bash");
        assert!(det.confidence >= MIN_DETECTION_CONFIDENCE);
    }

    #[test]
    fn content_known_extension_wins() {
        let reg = LanguageRegistry::with_builtins();
        let det = reg
            .detect_from_content("#!/usr/bin/env bash\n", Some("main.go"))
            .unwrap();
        assert_eq!(det.language, "go");
        assert!((det.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn content_without_signal_is_none() {
        let reg = LanguageRegistry::with_builtins();
        assert!(reg.detect_from_content("hello world", None).is_none());
    }

    #[test]
    fn content_tie_keeps_first_registered() {
        let mut reg = LanguageRegistry::new();
        reg.register(
            LanguageConfig::new("first", "First").with_shebangs(&["tool"]),
            &[],
            &[],
        );
        reg.register(
            LanguageConfig::new("second", "Second").with_shebangs(&["tool"]),
            &[],
            &[],
        );
        let det = reg.detect_from_content("#!/usr/bin/tool\n", None).unwrap();
        assert_eq!(det.language, "first");
    }

    #[test]
    fn register_merges_extensions_and_aliases() {
        let mut reg = LanguageRegistry::new();
        reg.register(LanguageConfig::new("Nim", "Nim"), &["nim", ".NIMS"], &["NimLang"]);
        assert!(reg.has("nim"));
        assert!(reg.has("nimlang"));
        assert_eq!(reg.extensions(), vec![".nim", ".nims"]);
    }

    #[test]
    fn unregister_removes_aliases_and_extensions() {
        let mut reg = LanguageRegistry::with_builtins();
        assert!(reg.unregister("py"));
        assert!(!reg.has("python"));
        assert!(!reg.has("py"));
        assert!(reg.detect_language(Path::new("a.py")).is_none());
        assert!(!reg.unregister("python"));
        assert_eq!(reg.detect_language(Path::new("a.rs")).unwrap().name, "rust");
    }

    #[test]
    fn reregister_replaces() {
        let mut reg = LanguageRegistry::with_builtins();
        let count = reg.list_languages().len();
        reg.register(LanguageConfig::new("rust", "Rust 2"), &[".rs"], &[]);
        assert_eq!(reg.list_languages().len(), count);
        assert_eq!(reg.get("rust").unwrap().display_name, "Rust 2");
    }

    #[test]
    fn reregister_keeps_registration_order() {
        let mut reg = LanguageRegistry::new();
        for name in ["first", "second"] {
            reg.register(LanguageConfig::new(name, name).with_shebangs(&["tool"]), &[], &[]);
        }
        reg.register(
            LanguageConfig::new("first", "First v2").with_shebangs(&["tool"]),
            &[".fst"],
            &[],
        );
        let det = reg.detect_from_content("#!/usr/bin/tool\n", None).unwrap();
        assert_eq!(det.language, "first");
        let order: Vec<&str> = reg.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
        assert_eq!(reg.detect_language(Path::new("a.fst")).unwrap().display_name, "First v2");
    }

    #[test]
    fn tier_through_registry_alias() {
        let reg = LanguageRegistry::with_builtins();
        assert_eq!(reg.tier("node").tier, LanguageTier::Tier1);
        assert_eq!(reg.tier("unknown-lang").tier, LanguageTier::Tier3);
    }

    #[test]
    fn config_language_lookup() {
        let reg = LanguageRegistry::with_builtins();
        assert!(reg.is_config_language("yml"));
        assert!(!reg.is_config_language("python"));
    }
}
