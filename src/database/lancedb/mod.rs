// LanceDB vector database module
// Handles vector storage and space-scoped similarity search for embeddings

pub mod vector_store;

pub use vector_store::{INDEX_THRESHOLD_ROWS, VectorStore};

/// Escape a value for use inside a single-quoted LanceDB filter literal
#[inline]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
