//! Code-intelligence indexing: language registry, tree-sitter extraction,
//! AST-aware chunking, and the symbol and graph stores.
//!
//! A [`languages::LanguageRegistry`] is built once and shared by reference.
//! Everything above it branches on the queries a language declares, never on
//! its name.

pub mod chunker;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod ignore_policy;
pub mod languages;
pub mod symbol_store;
pub mod unified;
pub mod watcher;

pub use error::{IndexError, Result};
