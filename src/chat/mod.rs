//! Streaming chat against an OpenAI-compatible completion API
//!
//! A [`ChatSession`] owns the ordered conversation and forwards the full
//! history on every turn; the [`ChatBackend`] streams the reply back as text
//! fragments.

mod openai;
mod sse;

pub use openai::*;
pub use sse::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Reply fragments in arrival order
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Transport to a streaming completion API
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Submit the whole conversation and stream the reply
    async fn stream_completion(&self, api_key: &str, messages: &[ChatMessage])
        -> Result<ChunkStream>;
}

/// One user's conversation
///
/// Turns are serialized, but the history lock is only taken briefly, so
/// reading the history never waits on a reply that is still streaming.
#[derive(Debug, Default)]
pub struct ChatSession {
    history: RwLock<Vec<ChatMessage>>,
    turn: Mutex<()>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the conversation so far
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.read().await.clone()
    }

    /// Run one turn of the conversation
    ///
    /// The user message is appended before the request and the concatenated
    /// reply after the stream ends. `on_chunk` sees every fragment as it
    /// arrives. A missing key fails before the history is touched. If the
    /// stream breaks, whatever text already arrived is kept as the assistant
    /// message.
    pub async fn send_turn<F>(
        &self,
        backend: &dyn ChatBackend,
        api_key: Option<&str>,
        text: &str,
        mut on_chunk: F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(Error::AuthenticationMissing)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("Message must not be empty".to_string()));
        }

        let _turn = self.turn.lock().await;
        let messages = {
            let mut history = self.history.write().await;
            history.push(ChatMessage::user(text));
            history.clone()
        };
        debug!(messages = messages.len(), "Requesting completion");

        let mut stream = backend
            .stream_completion(api_key, &messages)
            .await
            .map_err(into_upstream)?;

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(fragment) => {
                    on_chunk(&fragment);
                    reply.push_str(&fragment);
                }
                Err(e) => {
                    warn!("Completion stream failed after {} bytes: {}", reply.len(), e);
                    if !reply.is_empty() {
                        self.history.write().await.push(ChatMessage::assistant(reply));
                    }
                    return Err(into_upstream(e));
                }
            }
        }

        self.history
            .write()
            .await
            .push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }
}

fn into_upstream(err: Error) -> Error {
    match err {
        Error::Upstream(_) => err,
        other => Error::Upstream(other.to_string()),
    }
}
