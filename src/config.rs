use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sextant_embed::EmbeddingConfig;
use sextant_index::chunker::ChunkConfig;
use sextant_index::ignore_policy::IgnorePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "sextant.toml";

/// Top-level `sextant.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub chunking: ChunkConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Database directory. Relative paths resolve against the indexed root.
    pub data_dir: PathBuf,
    pub extra_skip_dirs: Vec<String>,
    /// Rebuild every file on each pass.
    pub force: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".sextant"),
            extra_skip_dirs: Vec::new(),
            force: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SEXTANT_DB_DIR") {
            self.index.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SEXTANT_VECTOR_STORE") {
            self.embedding.vector_store = v;
        }
        if let Ok(v) = std::env::var("SEXTANT_EMBEDDING_MODEL_TYPE") {
            self.embedding.embedding_model_type = v;
        }
        if let Ok(v) = std::env::var("SEXTANT_EMBEDDING_MODEL") {
            self.embedding.embedding_model_name = v;
        }
        if let Ok(v) = std::env::var("SEXTANT_EMBEDDING_API_KEY") {
            self.embedding.embedding_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("SEXTANT_QDRANT_URL") {
            self.embedding
                .extra_config
                .insert("url".into(), serde_json::Value::String(v));
        }
        if let Ok(v) = std::env::var("SEXTANT_EMBED_CONCURRENCY") {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => self.embedding.concurrency = n,
                _ => tracing::warn!("ignoring invalid SEXTANT_EMBED_CONCURRENCY value: {v}"),
            }
        }
    }

    /// Database directory for the repository at `root`.
    #[must_use]
    pub fn data_dir(&self, root: &Path) -> PathBuf {
        if self.index.data_dir.is_absolute() {
            self.index.data_dir.clone()
        } else {
            root.join(&self.index.data_dir)
        }
    }

    #[must_use]
    pub fn ignore_policy(&self) -> IgnorePolicy {
        IgnorePolicy::new().with_extra_skip_dirs(self.index.extra_skip_dirs.iter().cloned())
    }

    /// Embedding settings with `persist_directory` defaulted to the data dir.
    #[must_use]
    pub fn embedding_for(&self, root: &Path) -> EmbeddingConfig {
        let mut embedding = self.embedding.clone();
        if embedding.persist_directory.is_none() {
            embedding.persist_directory = Some(self.data_dir(root));
        }
        embedding
    }
}

/// `--config`, else `SEXTANT_CONFIG`, else `sextant.toml` in the working directory.
#[must_use]
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_owned();
    }
    if let Ok(path) = std::env::var("SEXTANT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    const ENV_KEYS: [&str; 8] = [
        "SEXTANT_DB_DIR",
        "SEXTANT_VECTOR_STORE",
        "SEXTANT_EMBEDDING_MODEL_TYPE",
        "SEXTANT_EMBEDDING_MODEL",
        "SEXTANT_EMBEDDING_API_KEY",
        "SEXTANT_QDRANT_URL",
        "SEXTANT_EMBED_CONCURRENCY",
        "SEXTANT_CONFIG",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_when_file_missing() {
        clear_env();
        let config = Config::load(Path::new("/nonexistent/sextant.toml")).unwrap();
        assert_eq!(config.index.data_dir, PathBuf::from(".sextant"));
        assert!(!config.index.force);
        assert_eq!(config.chunking, ChunkConfig::default());
        assert_eq!(config.embedding.vector_store, "memory");
        assert_eq!(config.embedding.embedding_model_type, "hash");
        assert_eq!(config.embedding.concurrency, 8);
    }

    #[test]
    #[serial]
    fn parse_sections() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sextant.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"
[index]
data_dir = "/var/lib/sextant"
extra_skip_dirs = ["generated"]

[chunking]
max_chunk_tokens = 256
strategy = "hierarchical"

[embedding]
vector_store = "sqlite"
distance_metric = "euclidean"

[embedding.extra_config]
url = "http://qdrant:6334"
"#
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.data_dir(Path::new("/repo")), PathBuf::from("/var/lib/sextant"));
        assert_eq!(config.chunking.max_chunk_tokens, 256);
        assert_eq!(config.chunking.overlap_tokens, 64);
        assert_eq!(config.embedding.vector_store, "sqlite");
        assert_eq!(config.embedding.extra_str("url"), Some("http://qdrant:6334"));
        assert!(config.ignore_policy().is_ignored_segment("generated"));
        assert!(config.ignore_policy().is_ignored_segment("node_modules"));
    }

    #[test]
    #[serial]
    fn malformed_file_is_an_error() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[index\ndata_dir = ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    #[serial]
    fn env_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("SEXTANT_DB_DIR", "/tmp/sextant-db");
            std::env::set_var("SEXTANT_VECTOR_STORE", "qdrant");
            std::env::set_var("SEXTANT_EMBEDDING_MODEL_TYPE", "ollama");
            std::env::set_var("SEXTANT_EMBEDDING_MODEL", "nomic-embed-text");
            std::env::set_var("SEXTANT_EMBEDDING_API_KEY", "sk-test");
            std::env::set_var("SEXTANT_QDRANT_URL", "http://remote:6334");
            std::env::set_var("SEXTANT_EMBED_CONCURRENCY", "3");
        }
        let config = Config::load(Path::new("/nonexistent/sextant.toml")).unwrap();
        clear_env();

        assert_eq!(config.index.data_dir, PathBuf::from("/tmp/sextant-db"));
        assert_eq!(config.embedding.vector_store, "qdrant");
        assert_eq!(config.embedding.embedding_model_type, "ollama");
        assert_eq!(config.embedding.embedding_model_name, "nomic-embed-text");
        assert_eq!(config.embedding.embedding_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.embedding.extra_str("url"), Some("http://remote:6334"));
        assert_eq!(config.embedding.concurrency, 3);
    }

    #[test]
    #[serial]
    fn invalid_concurrency_is_ignored() {
        clear_env();
        unsafe { std::env::set_var("SEXTANT_EMBED_CONCURRENCY", "many") };
        let config = Config::load(Path::new("/nonexistent/sextant.toml")).unwrap();
        unsafe { std::env::set_var("SEXTANT_EMBED_CONCURRENCY", "0") };
        let zero = Config::load(Path::new("/nonexistent/sextant.toml")).unwrap();
        clear_env();

        assert_eq!(config.embedding.concurrency, 8);
        assert_eq!(zero.embedding.concurrency, 8);
    }

    #[test]
    fn relative_data_dir_resolves_against_root() {
        let config = Config::default();
        assert_eq!(config.data_dir(Path::new("/repo")), PathBuf::from("/repo/.sextant"));
        let embedding = config.embedding_for(Path::new("/repo"));
        assert_eq!(embedding.persist_directory, Some(PathBuf::from("/repo/.sextant")));
    }

    #[test]
    #[serial]
    fn config_path_resolution() {
        clear_env();
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
        unsafe { std::env::set_var("SEXTANT_CONFIG", "/etc/sextant.toml") };
        assert_eq!(resolve_config_path(None), PathBuf::from("/etc/sextant.toml"));
        assert_eq!(
            resolve_config_path(Some(Path::new("custom.toml"))),
            PathBuf::from("custom.toml")
        );
        clear_env();
    }
}
