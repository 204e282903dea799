// Hosted model providers for embeddings and text generation

pub mod gemini;
pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, ProviderKind};

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Input text is empty")]
    EmptyInput,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Upstream returned an empty completion")]
    EmptyCompletion,
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

impl ProviderError {
    /// Whether sending the same request again could succeed
    #[inline]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::EmptyInput | Self::MissingCredential(_))
    }
}

/// Turns text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension every returned vector has
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Produces a free-text completion for a prompt
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Build the embedder and generator selected by `config.provider`
#[inline]
pub fn build_providers(config: &Config) -> Result<(Arc<dyn Embedder>, Arc<dyn Generator>)> {
    match config.provider {
        ProviderKind::Ollama => {
            let client = Arc::new(
                OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?,
            );
            Ok((client.clone(), client))
        }
        ProviderKind::Gemini => {
            let api_key = config
                .gemini
                .api_key()
                .context("Gemini provider selected but no API key is available")?;
            let client = Arc::new(
                GeminiClient::new(&config.gemini, api_key)
                    .context("Failed to create Gemini client")?,
            );
            Ok((client.clone(), client))
        }
    }
}

pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    // Status codes are inspected by the callers so the error body can be kept
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

pub(crate) fn map_transport_error(error: ureq::Error, timeout: Duration) -> ProviderError {
    match error {
        ureq::Error::Timeout(_) => ProviderError::Timeout(timeout),
        ureq::Error::StatusCode(status) => ProviderError::Status {
            status,
            body: String::new(),
        },
        other => ProviderError::Transport(other.to_string()),
    }
}

/// POST a JSON body and return the response text of a 2xx reply
pub(crate) fn post_json(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    body: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let mut request = agent.post(url).header("Content-Type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let mut response = request
        .send(body)
        .map_err(|e| map_transport_error(e, timeout))?;

    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| map_transport_error(e, timeout))?;

    if !(200..300).contains(&status) {
        return Err(ProviderError::Status { status, body: text });
    }

    Ok(text)
}

pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), ProviderError> {
    if vector.len() != expected {
        return Err(ProviderError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Run a blocking HTTP call without stalling the async runtime
pub(crate) async fn run_blocking<T, F>(call: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ProviderError::Transport(format!("Provider task failed: {e}")))?
}
