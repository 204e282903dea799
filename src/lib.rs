use thiserror::Error;

pub type Result<T> = std::result::Result<T, CofounderError>;

#[derive(Error, Debug)]
pub enum CofounderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Indexer error: {0}")]
    Indexer(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod indexer;
pub mod providers;
pub mod rag;

#[cfg(test)]
pub(crate) mod test_support;
