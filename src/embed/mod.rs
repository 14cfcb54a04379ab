//! Text embedding
//!
//! Nothing is embedded in-process: page text is sent to an HTTP embedding
//! backend and the vector it returns is what the store upserts.

mod http_backend;

pub use http_backend::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Vector size every result must have
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;

    async fn embed_one(&self, text: String) -> Result<Vec<f32>> {
        self.embed(vec![text])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("Embedding backend returned no vector".to_string()))
    }
}

/// Build the configured embedder
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    Ok(Box::new(HttpEmbedder::new(config)?))
}
