// Embedding storage and scoped similarity search


use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::ContextItem;
use super::content::truncate_chars;
use crate::CofounderError;
use crate::database::{EmbeddingRecord, EmbeddingRepository, SourceType};
use crate::providers::{Embedder, ProviderError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to embed content: {0}")]
    Embedding(#[from] ProviderError),
    #[error("Failed to access embedding store: {0}")]
    Store(#[from] CofounderError),
}

impl PipelineError {
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Embedding(e) => e.is_retryable(),
            Self::Store(_) => true,
        }
    }
}

/// Ties an embedder to an embedding repository.
///
/// `store_embedding` and `search_context` absorb every failure so that callers only
/// ever see a degraded result. `index_source` and `remove_source` report failures so
/// the background indexer can retry them.
#[derive(Clone)]
pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    repository: Arc<dyn EmbeddingRepository>,
    max_content_chars: usize,
}

impl RetrievalPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        repository: Arc<dyn EmbeddingRepository>,
        max_content_chars: usize,
    ) -> Self {
        Self {
            embedder,
            repository,
            max_content_chars,
        }
    }

    #[inline]
    pub fn repository(&self) -> &Arc<dyn EmbeddingRepository> {
        &self.repository
    }

    #[inline]
    pub fn max_content_chars(&self) -> usize {
        self.max_content_chars
    }

    /// Embed `content` and upsert it as the single row of `(source_type, source_id)`
    #[inline]
    pub async fn index_source(
        &self,
        source_type: SourceType,
        source_id: &str,
        content: &str,
        space_id: &str,
    ) -> Result<EmbeddingRecord, PipelineError> {
        let content = truncate_chars(content, self.max_content_chars);
        let vector = self.embedder.embed(content).await?;

        let expected = self.repository.dimension();
        if vector.len() != expected {
            return Err(ProviderError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }
            .into());
        }

        let record = EmbeddingRecord::new(source_type, source_id, space_id, content, vector);
        self.repository.upsert_embedding(record.clone()).await?;

        debug!(
            "Stored embedding for {} in space {}",
            record.source_key(),
            space_id
        );
        Ok(record)
    }

    /// Best-effort store: returns whether a row was written, logging any failure
    #[inline]
    pub async fn store_embedding(
        &self,
        source_type: SourceType,
        source_id: &str,
        content: &str,
        space_id: &str,
    ) -> bool {
        match self
            .index_source(source_type, source_id, content, space_id)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "Skipping embedding for {}: {}",
                    source_type.source_key(source_id),
                    e
                );
                false
            }
        }
    }

    /// Rows of `space_id` closest to `query`, most similar first.
    ///
    /// Never fails: any embedding or store error yields an empty list.
    #[inline]
    pub async fn search_context(
        &self,
        query: &str,
        space_id: &str,
        limit: usize,
    ) -> Vec<ContextItem> {
        if limit == 0 {
            return Vec::new();
        }

        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Failed to embed query for space {}: {}", space_id, e);
                return Vec::new();
            }
        };

        let matches = match self
            .repository
            .query_nearest(&vector, space_id, limit)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Similarity search failed for space {}: {}", space_id, e);
                return Vec::new();
            }
        };

        let found = matches.len();
        let items: Vec<ContextItem> = matches
            .into_iter()
            .filter(|nearest| nearest.space_id == space_id)
            .take(limit)
            .map(ContextItem::from)
            .collect();

        if items.len() != found {
            warn!(
                "Dropped {} rows outside space {} from search results",
                found - items.len(),
                space_id
            );
        }
        debug!("Retrieved {} context rows for space {}", items.len(), space_id);

        items
    }

    /// Delete the embedding of a source, if any
    #[inline]
    pub async fn remove_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<(), PipelineError> {
        self.repository
            .delete_source(source_type, source_id)
            .await?;
        debug!("Removed embedding for {}", source_type.source_key(source_id));
        Ok(())
    }
}
