// Deterministic providers and repositories shared by unit tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::database::{EmbeddingRecord, EmbeddingRepository, NearestMatch, SourceType};
use crate::providers::{Embedder, Generator, ProviderError};
use crate::{CofounderError, Result};

const VOCABULARY: &[&str] = &[
    "launch", "q4", "roadmap", "hiring", "hire", "developer", "react", "mvp", "ship", "users",
    "pricing", "investor", "fundraising", "marketing", "design", "customer",
];

/// Maps each known keyword to its own axis plus a constant bias axis, so texts
/// sharing a keyword are close and every vector is non-zero
pub(crate) struct KeywordEmbedder;

impl KeywordEmbedder {
    pub(crate) fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; VOCABULARY.len() + 1];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            if let Some(position) = VOCABULARY.iter().position(|known| *known == word) {
                vector[position] += 1.0;
            }
        }
        vector[VOCABULARY.len()] = 0.1;
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }
        Ok(Self::vector_for(text))
    }
}

pub(crate) struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Status {
            status: 503,
            body: "embedding model unavailable".to_string(),
        })
    }
}

/// Returns a fixed answer (or error) and records every prompt it receives
pub(crate) struct ScriptedGenerator {
    answer: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            answer: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            answer: Some("too late".to_string()),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.clone().ok_or(ProviderError::Status {
            status: 500,
            body: "upstream secret detail".to_string(),
        })
    }
}

/// Repository whose every operation fails
pub(crate) struct FailingRepository;

#[async_trait]
impl EmbeddingRepository for FailingRepository {
    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn upsert_embedding(&self, _record: EmbeddingRecord) -> Result<()> {
        Err(CofounderError::Database("disk full".to_string()))
    }

    async fn query_nearest(
        &self,
        _vector: &[f32],
        _space_id: &str,
        _limit: usize,
    ) -> Result<Vec<NearestMatch>> {
        Err(CofounderError::Database("table missing".to_string()))
    }

    async fn delete_source(&self, _source_type: SourceType, _source_id: &str) -> Result<()> {
        Err(CofounderError::Database("table missing".to_string()))
    }
}

/// Repository that ignores the space filter, used to prove the post-retrieval check
pub(crate) struct LeakyRepository {
    pub(crate) rows: Vec<NearestMatch>,
}

#[async_trait]
impl EmbeddingRepository for LeakyRepository {
    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn upsert_embedding(&self, _record: EmbeddingRecord) -> Result<()> {
        Ok(())
    }

    async fn query_nearest(
        &self,
        _vector: &[f32],
        _space_id: &str,
        limit: usize,
    ) -> Result<Vec<NearestMatch>> {
        Ok(self.rows.iter().take(limit).cloned().collect())
    }

    async fn delete_source(&self, _source_type: SourceType, _source_id: &str) -> Result<()> {
        Ok(())
    }
}
