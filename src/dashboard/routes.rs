//! Request handlers

use super::{AppState, ApiError, BrowserSession, Features};
use crate::crawl::{CrawlRequest, CrawlSessionState};
use crate::chat::ChatMessage;
use crate::error::Error;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::Json;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header carrying the page's session token
pub const SESSION_HEADER: &str = "x-session-id";

const MAX_SESSION_ID_LEN: usize = 64;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub api_key: Option<String>,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct CrawlForm {
    pub url: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CrawlView {
    #[serde(flatten)]
    pub state: CrawlSessionState,
    pub progress: f32,
}

impl From<CrawlSessionState> for CrawlView {
    fn from(state: CrawlSessionState) -> Self {
        let progress = state.progress();
        Self { state, progress }
    }
}

fn session_id(headers: &HeaderMap) -> Result<String, ApiError> {
    let id = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(Error::InvalidInput(format!(
            "Missing or malformed {} header",
            SESSION_HEADER
        ))
        .into());
    }
    Ok(id.to_string())
}

async fn browser_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<BrowserSession>, ApiError> {
    let id = session_id(headers)?;
    Ok(state.session(&id).await)
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn status(State(state): State<AppState>) -> Json<Features> {
    Json(state.features().clone())
}

/// Run one chat turn and stream the reply as server-sent events
///
/// Emits `chunk` events with `{"text"}`, then `done` with the full reply or
/// `error` with a message.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<ChatForm>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = browser_session(&state, &headers).await?;

    let api_key = form
        .api_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or(Error::AuthenticationMissing)?;
    let prompt = form.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(Error::InvalidInput("Message must not be empty".to_string()).into());
    }

    let (tx, rx) = mpsc::unbounded::<Event>();
    let backend = state.chat_backend();

    tokio::spawn(async move {
        let result = session
            .chat
            .send_turn(backend.as_ref(), Some(&api_key), &prompt, |fragment| {
                let _ = tx.unbounded_send(sse_event("chunk", json!({ "text": fragment })));
            })
            .await;

        let last = match result {
            Ok(reply) => {
                info!(chars = reply.len(), "Chat turn complete");
                sse_event("done", json!({ "content": reply }))
            }
            Err(e) => {
                warn!("Chat turn failed: {}", e);
                sse_event("error", json!({ "message": e.to_string() }))
            }
        };
        if tx.unbounded_send(last).is_err() {
            debug!("Browser left before the chat turn finished");
        }
    });

    Ok(Sse::new(rx.map(Ok::<Event, Infallible>)).keep_alive(KeepAlive::default()))
}

fn sse_event(name: &str, payload: serde_json::Value) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event("error"))
}

pub async fn chat_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let session = browser_session(&state, &headers).await?;
    Ok(Json(session.chat.history().await))
}

/// Validate the form and start a background crawl
pub async fn start_crawl(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<CrawlForm>,
) -> Result<impl IntoResponse, ApiError> {
    let session = browser_session(&state, &headers).await?;

    let features = state.features();
    let limit = form.limit.unwrap_or(features.default_page_limit);
    if limit == 0 || limit > features.max_page_limit {
        return Err(Error::InvalidInput(format!(
            "Page limit must be between 1 and {}",
            features.max_page_limit
        ))
        .into());
    }

    let request = CrawlRequest::new(&form.url, limit)?;
    info!(
        "Crawl requested for {} (limit {})",
        request.url(),
        request.page_limit()
    );
    // The job runs detached; its outcome is reported through the session.
    let _job = state
        .crawler()
        .spawn(request, session.crawl.clone())
        .await?;

    let view = CrawlView::from(session.crawl.snapshot().await);
    Ok((StatusCode::ACCEPTED, Json(view)))
}

pub async fn crawl_state(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CrawlView>, ApiError> {
    let session = browser_session(&state, &headers).await?;
    Ok(Json(CrawlView::from(session.crawl.snapshot().await)))
}

/// Drop the session's chat history and crawl state
pub async fn end_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let id = session_id(&headers)?;
    state.end_session(&id).await;
    Ok(StatusCode::NO_CONTENT)
}
