// Database module
// SQLite holds the relational data and the embedding job outbox, LanceDB holds the vectors


pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Result;

/// Kind of content an embedding was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum SourceType {
    Chat,
    Journal,
    Doc,
    Task,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Chat,
        SourceType::Journal,
        SourceType::Doc,
        SourceType::Task,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Chat => "CHAT",
            SourceType::Journal => "JOURNAL",
            SourceType::Doc => "DOC",
            SourceType::Task => "TASK",
        }
    }

    /// Key identifying the single embedding row of a source, e.g. `DOC:<uuid>`
    #[inline]
    pub fn source_key(self, source_id: &str) -> String {
        format!("{}:{}", self.as_str(), source_id)
    }
}

impl std::fmt::Display for SourceType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = crate::CofounderError;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CHAT" => Ok(SourceType::Chat),
            "JOURNAL" => Ok(SourceType::Journal),
            "DOC" => Ok(SourceType::Doc),
            "TASK" => Ok(SourceType::Task),
            other => Err(crate::CofounderError::Database(format!(
                "Unknown source type: {other}"
            ))),
        }
    }
}

/// A vector together with the text it was computed from
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub source_type: SourceType,
    /// Loose reference to the source row, not a foreign key
    pub source_id: String,
    pub space_id: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    #[inline]
    pub fn new(
        source_type: SourceType,
        source_id: impl Into<String>,
        space_id: impl Into<String>,
        content: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_type,
            source_id: source_id.into(),
            space_id: space_id.into(),
            content: content.into(),
            vector,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn source_key(&self) -> String {
        self.source_type.source_key(&self.source_id)
    }
}

/// A stored embedding returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq)]
pub struct NearestMatch {
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub space_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Cosine distance to the query vector, lower is closer
    pub distance: f32,
}

impl NearestMatch {
    /// Similarity in `[-1, 1]` derived from the cosine distance
    #[inline]
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Identity of a stored embedding without its vector or text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub source_type: SourceType,
    pub source_id: String,
    pub space_id: String,
}

impl SourceRef {
    #[inline]
    pub fn source_key(&self) -> String {
        self.source_type.source_key(&self.source_id)
    }
}

/// Persistence boundary for embeddings
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Dimension every stored vector must have
    fn dimension(&self) -> usize;

    /// Insert the record, replacing any existing row for the same source
    async fn upsert_embedding(&self, record: EmbeddingRecord) -> Result<()>;

    /// Rows of `space_id` ordered by ascending cosine distance, at most `limit`
    async fn query_nearest(
        &self,
        vector: &[f32],
        space_id: &str,
        limit: usize,
    ) -> Result<Vec<NearestMatch>>;

    async fn delete_source(&self, source_type: SourceType, source_id: &str) -> Result<()>;
}
