//! OpenAI-compatible embedding provider.
//!
//! Calls `POST {api_base}/embeddings`. The HTTP client is async; the trait is
//! synchronous, so requests are driven with the runtime handle captured at
//! construction. `embed_batch` must therefore run off the async worker threads
//! (inside `spawn_blocking`), which is how the context manager calls it.

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const PROVIDER: &str = "openai";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

fn embed_err(e: impl std::fmt::Display) -> Error {
    Error::embedding(PROVIDER, e)
}

/// Native output size of the well-known OpenAI embedding models.
fn default_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingProvider {
    http_client: reqwest::Client,
    runtime: Handle,
    api_base: String,
    api_key: String,
    model: String,
    dimensions: usize,
    /// Sent to the API only when the user asked for a non-native size.
    requested_dimensions: Option<usize>,
}

impl OpenAiEmbeddingProvider {
    /// Build from config, reading the key from `OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Self::with_api_key(config, std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::config("openai embeddings need OPENAI_API_KEY to be set"))?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let dimensions = config
            .dimensions
            .or_else(|| default_dimensions(&model))
            .ok_or_else(|| {
                Error::config(format!(
                    "unknown dimension for embedding model {model}; set embeddings.dimensions"
                ))
            })?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("openai embeddings must be created inside a tokio runtime"))?;

        Ok(Self {
            http_client: reqwest::Client::new(),
            runtime,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            requested_dimensions: config.dimensions,
            model,
            dimensions,
        })
    }

    fn request_body<'a>(&'a self, texts: &'a [&'a str]) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        }
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(texts))
            .send()
            .await
            .map_err(|e| embed_err(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(embed_err(format!("API error {status}: {body_text}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| embed_err(format!("failed to parse response: {e}")))?;
        into_ordered(parsed, texts.len())
    }
}

/// Order vectors by their `index` field and check every input got one.
fn into_ordered(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    data.sort_by_key(|d| d.index);
    let in_sequence = data.iter().enumerate().all(|(i, d)| d.index == i);
    if data.len() != expected || !in_sequence {
        return Err(embed_err(format!(
            "expected {expected} embeddings, got {} (indices not contiguous: {})",
            data.len(),
            !in_sequence
        )));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.runtime.block_on(self.request(texts))
    }
}
