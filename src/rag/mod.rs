// Retrieval-augmented answering: content representation, search, context and prompts


pub mod chat;
pub mod content;
pub mod context;
pub mod pipeline;
pub mod prompt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::database::SourceType;
pub use chat::{ChatError, ChatRequest, ChatResponse, CoFounder};
pub use context::assemble_context;
pub use pipeline::{PipelineError, RetrievalPipeline};
pub use prompt::{FALLBACK_CONTEXT, build_prompt};

use crate::database::NearestMatch;

/// A retrieved row as handed to the assembler and returned to API callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub source_id: String,
    pub created_at: DateTime<Utc>,
    /// Cosine similarity to the query
    pub score: f32,
}

impl From<NearestMatch> for ContextItem {
    #[inline]
    fn from(nearest: NearestMatch) -> Self {
        let score = nearest.similarity();
        Self {
            id: nearest.id,
            content: nearest.content,
            source_type: nearest.source_type,
            source_id: nearest.source_id,
            created_at: nearest.created_at,
            score,
        }
    }
}
