//! Error types for sextant-index.

use std::num::TryFromIntError;

/// Errors that can occur while detecting, extracting, chunking or storing code.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tree-sitter parsing error.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Language name or alias not present in the registry.
    #[error("unknown language '{name}'. Available: {available}")]
    UnknownLanguage { name: String, available: String },

    /// A declared query failed to compile against its grammar.
    #[error("invalid {kind} query for {language}: {message}")]
    Query {
        language: String,
        kind: &'static str,
        message: String,
    },

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Another index pass holds the repository.
    #[error("an index pass is already running for {0}")]
    IndexBusy(String),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
