//! HTTP embedding backend client
//!
//! Speaks the `POST /v1/embed/text` endpoint and accepts the three response
//! shapes seen in the wild: `embeddings`, `vectors` and OpenAI-style `data`.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Extra attempts after the first failed request
const RETRIES: u32 = 2;

/// Linear backoff step between attempts
const BACKOFF_STEP: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize)]
struct EmbedTextRequest<'a> {
    model: &'a str,
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedTextResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
    Data { data: Vec<DataItem> },
}

#[derive(Debug, Deserialize)]
struct DataItem {
    embedding: Vec<f32>,
}

impl From<EmbedTextResponse> for Vec<Vec<f32>> {
    fn from(response: EmbedTextResponse) -> Self {
        match response {
            EmbedTextResponse::Embeddings { embeddings } => embeddings,
            EmbedTextResponse::Vectors { vectors } => vectors,
            EmbedTextResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// One failed attempt, and whether another is worth making
struct Attempt {
    error: Error,
    retryable: bool,
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Client for the embedding backend
///
/// Transport failures, 5xx and 429 responses are retried with linear
/// backoff; any other rejection fails immediately.
pub struct EmbeddingClient {
    client: Client,
    endpoint: Url,
}

impl EmbeddingClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let endpoint = Url::parse(base_url)?
            .join("/v1/embed/text")
            .map_err(|e| Error::Config(format!("Invalid EMBEDDING_BACKEND_URL: {}", e)))?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, endpoint })
    }

    async fn attempt(
        &self,
        model: &str,
        inputs: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, Attempt> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedTextRequest { model, inputs })
            .send()
            .await
            .map_err(|e| Attempt {
                error: Error::Embedding(format!("Embedding backend unreachable: {}", e)),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt {
                error: Error::Embedding(format!("HTTP {}: {}", status, body.trim())),
                retryable: is_retryable(status),
            });
        }

        let parsed: EmbedTextResponse = response.json().await.map_err(|e| Attempt {
            error: Error::Embedding(format!("Unexpected embedding response: {}", e)),
            retryable: false,
        })?;
        Ok(parsed.into())
    }

    /// Embed `inputs` with `model`
    pub async fn embed_text(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.attempt(model, inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(failure) if failure.retryable && attempt < RETRIES => {
                    attempt += 1;
                    debug!("Embedding request failed ({}), retry {}", failure.error, attempt);
                    tokio::time::sleep(BACKOFF_STEP * attempt).await;
                }
                Err(failure) => {
                    warn!("Embedding request failed: {}", failure.error);
                    return Err(failure.error);
                }
            }
        }
    }
}

/// [`Embedder`] that checks the backend's output against the configured model
pub struct HttpEmbedder {
    client: EmbeddingClient,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: EmbeddingClient::new(&config.backend_url)?,
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.client.embed_text(&self.model, &texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Embedding backend returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model,
                self.dimension,
                bad.len()
            )));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
