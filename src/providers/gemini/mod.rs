#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    Embedder, Generator, ProviderError, build_agent, check_dimension, post_json, run_blocking,
};
use crate::config::GeminiConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Google Generative Language API
#[derive(Clone)]
pub struct GeminiClient {
    api_base: String,
    embedding_model: String,
    generation_model: String,
    dimension: usize,
    timeout: Duration,
    api_key: String,
    agent: ureq::Agent,
}

// The API key is deliberately left out
impl std::fmt::Debug for GeminiClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("embedding_model", &self.embedding_model)
            .field("generation_model", &self.generation_model)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow::Error::new(ProviderError::MissingCredential(
                config.api_key_env.clone(),
            )));
        }

        Url::parse(&config.api_base)
            .with_context(|| format!("Invalid Gemini API base: {}", config.api_base))?;

        let timeout = config.timeout();
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            dimension: config.embedding_dimension as usize,
            timeout,
            api_key,
            agent: build_agent(timeout),
        })
    }

    fn model_url(&self, model: &str, action: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, action)
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn embed_blocking(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        debug!("Generating Gemini embedding for text (length: {})", text.len());

        let request = EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
        };
        let request_json =
            serde_json::to_string(&request).map_err(|e| ProviderError::Decode(e.to_string()))?;

        let response_text = post_json(
            &self.agent,
            &self.model_url(&self.embedding_model, "embedContent"),
            &[(API_KEY_HEADER, self.api_key.as_str())],
            &request_json,
            self.timeout,
        )?;

        let response: EmbedContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        check_dimension(self.dimension, &response.embedding.values)?;
        Ok(response.embedding.values)
    }

    /// Generate a completion for a prompt sent as a single user turn
    #[inline]
    pub fn generate_blocking(&self, prompt: &str) -> Result<String, ProviderError> {
        debug!(
            "Generating completion with {} (prompt length: {})",
            self.generation_model,
            prompt.len()
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
        };
        let request_json =
            serde_json::to_string(&request).map_err(|e| ProviderError::Decode(e.to_string()))?;

        let response_text = post_json(
            &self.agent,
            &self.model_url(&self.generation_model, "generateContent"),
            &[(API_KEY_HEADER, self.api_key.as_str())],
            &request_json,
            self.timeout,
        )?;

        let response: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let answer: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }

        Ok(answer.to_string())
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let client = self.clone();
        let text = text.to_string();
        run_blocking(move || client.embed_blocking(&text)).await
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let client = self.clone();
        let prompt = prompt.to_string();
        run_blocking(move || client.generate_blocking(&prompt)).await
    }
}
