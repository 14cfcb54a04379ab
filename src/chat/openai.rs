//! OpenAI-compatible `chat/completions` client with `stream: true`

use super::{ChatBackend, ChatMessage, ChunkStream, SseDecoder};
use crate::config::ChatConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};
use url::Url;

/// Payload that terminates a completion stream
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

/// Streaming chat completion client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    idle_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Url::parse(&config.base_url)?;
        // No overall timeout: replies stream for as long as the model writes.
        // Each wait for headers or the next chunk is bounded by `idle_timeout`.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn stream_completion(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
    ) -> Result<ChunkStream> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, messages = messages.len(), "POST {}", url);

        let request = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&ChatCompletionRequest {
                model: &self.model,
                messages,
                stream: true,
            })
            .send();

        let response = timeout(self.idle_timeout, request)
            .await
            .map_err(|_| {
                error!("No response from {} within {:?}", url, self.idle_timeout);
                Error::Upstream(format!(
                    "No response within {}s",
                    self.idle_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Upstream(format!("Completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            error!("Completion request rejected: HTTP {}: {}", status, message);
            return Err(Error::Upstream(format!("HTTP {}: {}", status, message)));
        }

        Ok(fragments(Box::pin(response.bytes_stream()), self.idle_timeout))
    }
}

struct FragmentState<S> {
    body: S,
    idle_timeout: Duration,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    eof: bool,
    done: bool,
}

/// Turn a raw SSE body into reply fragments
///
/// Ends cleanly only at `[DONE]`. An in-band error object, a broken or
/// stalled body, or a body that ends without `[DONE]` yields one `Err` and
/// ends the stream.
fn fragments<S, B>(body: S, idle_timeout: Duration) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = FragmentState {
        body,
        idle_timeout,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        eof: false,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            if let Some(payload) = state.pending.pop_front() {
                if payload.trim() == DONE_MARKER {
                    state.done = true;
                    return None;
                }
                match parse_fragment(&payload) {
                    Ok(Some(text)) => return Some((Ok(text), state)),
                    Ok(None) => continue,
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }
            }

            if state.eof {
                state.done = true;
                return Some((
                    Err(Error::Upstream(
                        "Completion stream ended before [DONE]".to_string(),
                    )),
                    state,
                ));
            }

            let next = match timeout(state.idle_timeout, state.body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    state.done = true;
                    let message = format!(
                        "Completion stream stalled for {}s",
                        state.idle_timeout.as_secs()
                    );
                    return Some((Err(Error::Upstream(message)), state));
                }
            };

            match next {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(bytes.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((
                        Err(Error::Upstream(format!("Completion stream broke: {}", e))),
                        state,
                    ));
                }
                None => {
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                    state.eof = true;
                }
            }
        }
    })
    .boxed()
}

/// Extract the text delta of one event; `None` for role-only or empty deltas
fn parse_fragment(payload: &str) -> Result<Option<String>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(payload)
        .map_err(|e| Error::Upstream(format!("Malformed completion chunk: {}", e)))?;

    if let Some(err) = chunk.error {
        return Err(Error::Upstream(err.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}
