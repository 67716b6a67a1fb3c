//! Shared path-exclusion policy for every tree walk.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Directory names skipped by default: package caches, build outputs,
/// vendored and archived code.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    "venv",
    "env",
    "build",
    "dist",
    "target",
    "out",
    "coverage",
    "htmlcov",
    "vendor",
    "third_party",
    "archive",
    "site-packages",
];

/// Suffixes that mark a skipped directory regardless of prefix (`foo.egg-info`).
const SKIP_DIR_SUFFIXES: &[&str] = &[".egg-info"];

/// Excludes any path with a hidden segment or a segment in the skip set.
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    skip_dirs: BTreeSet<String>,
}

impl IgnorePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Add directory names on top of the defaults.
    #[must_use]
    pub fn with_extra_skip_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn skip_dirs(&self) -> Vec<&str> {
        self.skip_dirs.iter().map(String::as_str).collect()
    }

    /// Whether a single path segment is excluded.
    #[must_use]
    pub fn is_ignored_segment(&self, segment: &str) -> bool {
        (segment.starts_with('.') && segment != "." && segment != "..")
            || self.skip_dirs.contains(segment)
            || SKIP_DIR_SUFFIXES.iter().any(|s| segment.ends_with(s))
    }

    /// Whether `path` (relative to `root`) is excluded.
    #[must_use]
    pub fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let rel = path.strip_prefix(root).unwrap_or(path);
        rel.components().any(|c| match c {
            Component::Normal(seg) => seg.to_str().is_some_and(|s| self.is_ignored_segment(s)),
            _ => false,
        })
    }

    /// Every regular file under `root` that survives the policy, sorted.
    ///
    /// `.gitignore` rules are honoured on top of the policy.
    #[must_use]
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = ignore::WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .filter_entry({
                let policy = self.clone();
                let root = root.to_path_buf();
                move |entry| entry.depth() == 0 || !policy.is_ignored(&root, entry.path())
            })
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
            .map(ignore::DirEntry::into_path)
            .collect();
        files.sort();
        files
    }
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Path relative to `root` with forward slashes.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_and_skip_segments() {
        let policy = IgnorePolicy::new();
        let root = Path::new("/repo");
        assert!(policy.is_ignored(root, Path::new("/repo/.git/config")));
        assert!(policy.is_ignored(root, Path::new("/repo/a/node_modules/x.js")));
        assert!(policy.is_ignored(root, Path::new("/repo/pkg.egg-info/PKG-INFO")));
        assert!(!policy.is_ignored(root, Path::new("/repo/src/main.rs")));
    }

    #[test]
    fn root_outside_hidden_dir_is_not_ignored() {
        let policy = IgnorePolicy::new();
        let root = Path::new("/home/u/.cache/repo");
        assert!(!policy.is_ignored(root, Path::new("/home/u/.cache/repo/src/a.py")));
    }

    #[test]
    fn extra_skip_dirs() {
        let policy = IgnorePolicy::new().with_extra_skip_dirs(["generated"]);
        assert!(policy.is_ignored_segment("generated"));
        assert!(policy.skip_dirs().contains(&"generated"));
    }

    #[test]
    fn walk_applies_policy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("src/a.py"), "x = 1\n").unwrap();
        std::fs::write(root.join("node_modules/lib/b.js"), "x\n").unwrap();
        std::fs::write(root.join(".hidden/c.py"), "x\n").unwrap();

        let files = IgnorePolicy::new().walk(root);
        let rel: Vec<String> = files.iter().map(|p| relative_path(root, p)).collect();
        assert_eq!(rel, vec!["src/a.py"]);
    }
}
