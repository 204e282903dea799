// Chat orchestration: retrieve, assemble, prompt, generate


use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use super::{ContextItem, RetrievalPipeline, assemble_context, build_prompt};
use crate::config::RetrievalConfig;
use crate::providers::{Generator, ProviderError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatRequest {
    pub space_id: String,
    pub query: String,
    pub limit: Option<usize>,
}

impl ChatRequest {
    #[inline]
    pub fn new(space_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            query: query.into(),
            limit: None,
        }
    }

    #[inline]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub context: Vec<ContextItem>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Missing spaceId or query")]
    InvalidRequest,
    #[error("Generation failed: {0}")]
    Generation(#[from] ProviderError),
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Answers questions about a space from its retrieved history
#[derive(Clone)]
pub struct CoFounder {
    pipeline: RetrievalPipeline,
    generator: Arc<dyn Generator>,
    default_limit: usize,
    max_limit: usize,
    generation_timeout: Duration,
}

impl CoFounder {
    #[inline]
    pub fn new(
        pipeline: RetrievalPipeline,
        generator: Arc<dyn Generator>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            pipeline,
            generator,
            default_limit: retrieval.default_limit,
            max_limit: retrieval.max_limit,
            generation_timeout: retrieval.generation_timeout(),
        }
    }

    #[inline]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    #[inline]
    pub fn pipeline(&self) -> &RetrievalPipeline {
        &self.pipeline
    }

    /// Caller limit clamped to the configured maximum, or the default
    #[inline]
    pub fn resolve_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }

    /// Run the full retrieval and generation flow for one question.
    ///
    /// Retrieval problems only shrink the context. Generation problems are
    /// returned as errors and never as a partial answer.
    #[inline]
    pub async fn answer(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        let space_id = request.space_id.trim();
        let query = request.query.trim();
        if space_id.is_empty() || query.is_empty() {
            return Err(ChatError::InvalidRequest);
        }

        let limit = self.resolve_limit(request.limit);
        info!("Answering query for space {} (limit {})", space_id, limit);

        let context = self.pipeline.search_context(query, space_id, limit).await;
        let prompt = build_prompt(&assemble_context(&context), query);
        debug!(
            "Built prompt of {} chars from {} context rows",
            prompt.len(),
            context.len()
        );

        let answer = match tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(&prompt),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                error!("Generation failed for space {}: {}", space_id, e);
                return Err(ChatError::Generation(e));
            }
            Err(_) => {
                error!(
                    "Generation for space {} timed out after {:?}",
                    space_id, self.generation_timeout
                );
                return Err(ChatError::Timeout(self.generation_timeout));
            }
        };

        Ok(ChatResponse { answer, context })
    }
}
