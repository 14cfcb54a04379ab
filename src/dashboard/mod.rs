//! Browser dashboard
//!
//! Serves the two-tab page and the JSON/SSE API it talks to. Every browser
//! tab identifies itself with an `x-session-id` header; its chat history and
//! crawl state live in memory until the tab ends the session, the session
//! sits idle past its TTL, or the session cap pushes it out.

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{CrawlView, SESSION_HEADER};

use crate::chat::{ChatBackend, ChatSession, OpenAiClient};
use crate::config::{Config, DashboardConfig};
use crate::crawl::{CrawlSession, Crawler};
use crate::error::{Error, Result};
use crate::store::{DocumentIndex, VectorDb};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// What the server can do, as reported to the page
#[derive(Debug, Clone, Serialize)]
pub struct Features {
    pub crawl_enabled: bool,
    pub index_enabled: bool,
    pub collection: Option<String>,
    pub chat_model: String,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
}

/// State owned by one browser session
#[derive(Default)]
pub struct BrowserSession {
    pub chat: ChatSession,
    pub crawl: CrawlSession,
}

/// Bounds on the in-memory session table
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub ttl: Duration,
    pub max_sessions: usize,
}

impl From<&DashboardConfig> for SessionLimits {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.session_ttl_secs),
            max_sessions: config.max_sessions,
        }
    }
}

struct SessionEntry {
    session: Arc<BrowserSession>,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    crawler: Crawler,
    chat: Arc<dyn ChatBackend>,
    features: Features,
    limits: SessionLimits,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl AppState {
    pub fn new(
        crawler: Crawler,
        chat: Arc<dyn ChatBackend>,
        features: Features,
        limits: SessionLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                crawler,
                chat,
                features,
                limits,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Wire up the configured services
    ///
    /// The collection is created up front when the vector store is
    /// configured; failing to reach it is logged and the dashboard still
    /// starts.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let index = Arc::new(VectorDb::from_config(config)?);
        if index.is_enabled() {
            if let Err(e) = index.ensure_collection().await {
                warn!("Could not prepare collection: {}", e);
            }
        }

        let index_enabled = index.is_enabled();
        let collection = index.spec().map(|spec| spec.name.clone());
        let crawler = Crawler::from_config(config, index as Arc<dyn DocumentIndex>)?;
        let chat = OpenAiClient::new(&config.chat)?;

        let features = Features {
            crawl_enabled: crawler.is_enabled(),
            index_enabled,
            collection,
            chat_model: chat.model().to_string(),
            default_page_limit: config.dashboard.default_page_limit,
            max_page_limit: config.dashboard.max_page_limit,
        };

        Ok(Self::new(
            crawler,
            Arc::new(chat),
            features,
            SessionLimits::from(&config.dashboard),
        ))
    }

    pub fn features(&self) -> &Features {
        &self.inner.features
    }

    pub fn crawler(&self) -> &Crawler {
        &self.inner.crawler
    }

    pub fn chat_backend(&self) -> Arc<dyn ChatBackend> {
        Arc::clone(&self.inner.chat)
    }

    /// Look up a session, creating it on first use
    ///
    /// Every lookup refreshes the session's last-seen time. A session idle
    /// past the TTL is replaced by a fresh one.
    pub async fn session(&self, id: &str) -> Arc<BrowserSession> {
        let now = Instant::now();
        let limits = self.inner.limits;
        let mut sessions = self.inner.sessions.write().await;

        if let Some(entry) = sessions.get_mut(id) {
            if now.duration_since(entry.last_seen) < limits.ttl {
                entry.last_seen = now;
                return Arc::clone(&entry.session);
            }
        }

        evict_stale(&mut sessions, limits, now);
        info!(session = id, "New browser session");
        let session = Arc::new(BrowserSession::default());
        sessions.insert(
            id.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                last_seen: now,
            },
        );
        session
    }

    /// Forget a session; a crawl it started keeps running unobserved
    pub async fn end_session(&self, id: &str) -> bool {
        let removed = self.inner.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session = id, "Browser session ended");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}

/// Drop expired sessions, then the least recently seen until one more fits
fn evict_stale(
    sessions: &mut HashMap<String, SessionEntry>,
    limits: SessionLimits,
    now: Instant,
) {
    let before = sessions.len();
    sessions.retain(|_, entry| now.duration_since(entry.last_seen) < limits.ttl);

    while sessions.len() >= limits.max_sessions {
        let oldest = sessions
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => sessions.remove(&id),
            None => break,
        };
    }

    let evicted = before - sessions.len();
    if evicted > 0 {
        info!(evicted, remaining = sessions.len(), "Evicted idle browser sessions");
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/api/status", get(routes::status))
        .route("/api/chat", post(routes::chat))
        .route("/api/chat/history", get(routes::chat_history))
        .route(
            "/api/crawl",
            post(routes::start_crawl).get(routes::crawl_state),
        )
        .route("/api/session", delete(routes::end_session))
        .with_state(state)
}

/// Serve the dashboard until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::from_config(config).await?;

    let listener = TcpListener::bind(&config.dashboard.bind_addr)
        .await
        .map_err(|e| {
            Error::Config(format!(
                "Cannot bind {}: {}",
                config.dashboard.bind_addr, e
            ))
        })?;
    info!("Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down dashboard");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMessage, ChunkStream};
    use crate::crawl::{CrawlBackend, CrawlEvent, CrawlJob, CrawlRequest, ScrapedDocument};
    use crate::store::IndexedDocument;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream, StreamExt};
    use reqwest::StatusCode;
    use serde_json::{json, Map, Value};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeCrawl {
        starts: AtomicUsize,
    }

    #[async_trait]
    impl CrawlBackend for FakeCrawl {
        async fn start(&self, _request: &CrawlRequest) -> Result<CrawlJob> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(CrawlJob {
                id: "job-1".to_string(),
            })
        }

        fn watch(&self, _job: &CrawlJob) -> BoxStream<'static, Result<CrawlEvent>> {
            let events = ["https://example.com/", "https://example.com/about"]
                .into_iter()
                .map(|url| {
                    Ok(CrawlEvent::Document(ScrapedDocument {
                        url: url.to_string(),
                        markdown: "# page".to_string(),
                        metadata: Map::new(),
                    }))
                })
                .chain(std::iter::once(Ok(CrawlEvent::Done {
                    status: "completed".to_string(),
                })))
                .collect::<Vec<_>>();
            stream::iter(events).boxed()
        }
    }

    #[derive(Default)]
    struct CountingIndex {
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl DocumentIndex for CountingIndex {
        async fn upsert(&self, _document: IndexedDocument) -> Result<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct EchoChat {
        calls: AtomicUsize,
        stall: bool,
    }

    #[async_trait]
    impl ChatBackend for EchoChat {
        async fn stream_completion(
            &self,
            _api_key: &str,
            messages: &[ChatMessage],
        ) -> Result<ChunkStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                return Ok(stream::pending::<Result<String>>().boxed());
            }
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let fragments = vec![Ok("You said: ".to_string()), Ok(last)];
            Ok(stream::iter(fragments).boxed())
        }
    }

    struct Harness {
        addr: SocketAddr,
        client: reqwest::Client,
        crawl: Arc<FakeCrawl>,
        index: Arc<CountingIndex>,
        chat: Arc<EchoChat>,
        state: AppState,
    }

    impl Harness {
        async fn start(crawl_enabled: bool) -> Self {
            Self::build(crawl_enabled, false).await
        }

        /// A harness whose chat backend never sends a fragment
        async fn stalled_chat() -> Self {
            Self::build(true, true).await
        }

        async fn build(crawl_enabled: bool, stall: bool) -> Self {
            let crawl = Arc::new(FakeCrawl {
                starts: AtomicUsize::new(0),
            });
            let index = Arc::new(CountingIndex::default());
            let chat = Arc::new(EchoChat {
                calls: AtomicUsize::new(0),
                stall,
            });

            let backend = crawl_enabled.then(|| crawl.clone() as Arc<dyn CrawlBackend>);
            let crawler = Crawler::new(backend, index.clone() as Arc<dyn DocumentIndex>);
            let features = Features {
                crawl_enabled,
                index_enabled: true,
                collection: Some("demo_collection".to_string()),
                chat_model: "gpt-test".to_string(),
                default_page_limit: 10,
                max_page_limit: 100,
            };
            let state = AppState::new(
                crawler,
                chat.clone() as Arc<dyn ChatBackend>,
                features,
                SessionLimits::from(&DashboardConfig::default()),
            );

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = router(state.clone());
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                addr,
                client: reqwest::Client::new(),
                crawl,
                index,
                chat,
                state,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn get(&self, path: &str) -> reqwest::RequestBuilder {
            self.client
                .get(self.url(path))
                .header(SESSION_HEADER, "test-session")
        }

        fn post(&self, path: &str, body: Value) -> reqwest::RequestBuilder {
            self.client
                .post(self.url(path))
                .header(SESSION_HEADER, "test-session")
                .json(&body)
        }

        async fn crawl_state(&self) -> Value {
            self.get("/api/crawl").send().await.unwrap().json().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_index_page_has_both_tabs() {
        let harness = Harness::start(true).await;
        let body = harness
            .client
            .get(harness.url("/"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("Chat"));
        assert!(body.contains("Website Crawler"));
    }

    #[tokio::test]
    async fn test_page_ends_its_session_and_shows_crawl_errors() {
        let harness = Harness::start(true).await;
        let body = harness
            .client
            .get(harness.url("/"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains(r#"addEventListener("pagehide""#));
        assert!(body.contains(r#"method: "DELETE""#));
        assert!(body.contains("state.errors"));
    }

    #[tokio::test]
    async fn test_status_reports_features() {
        let harness = Harness::start(false).await;
        let status: Value = harness
            .client
            .get(harness.url("/api/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["crawl_enabled"], false);
        assert_eq!(status["max_page_limit"], 100);
    }

    #[tokio::test]
    async fn test_features_follow_configuration() {
        let config = Config::from_lookup(|key| match key {
            "FIRECRAWL_API_URL" => Some("http://127.0.0.1:3002".to_string()),
            "OPENAI_MODEL" => Some("gpt-4o-mini".to_string()),
            _ => None,
        })
        .unwrap();

        let state = AppState::from_config(&config).await.unwrap();
        let features = state.features();
        assert!(features.crawl_enabled);
        assert!(!features.index_enabled);
        assert!(features.collection.is_none());
        assert_eq!(features.chat_model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected_without_side_effects() {
        let harness = Harness::start(true).await;
        let response = harness
            .post("/api/crawl", json!({"url": "   ", "limit": 5}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(harness.crawl_state().await["status"], "idle");
        assert_eq!(harness.crawl.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_limit_out_of_range_is_rejected() {
        let harness = Harness::start(true).await;
        for limit in [0, 101] {
            let response = harness
                .post("/api/crawl", json!({"url": "https://example.com", "limit": limit}))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_requests_without_session_are_rejected() {
        let harness = Harness::start(true).await;
        let response = harness
            .client
            .get(harness.url("/api/crawl"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(harness.state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_crawl_runs_to_completion() {
        let harness = Harness::start(true).await;
        let response = harness
            .post("/api/crawl", json!({"url": "https://example.com", "limit": 2}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let mut state = harness.crawl_state().await;
        for _ in 0..50 {
            if state["status"] != "running" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            state = harness.crawl_state().await;
        }

        assert_eq!(state["status"], "complete");
        assert_eq!(state["progress"], 1.0);
        assert_eq!(state["results"][1], "Scraped: https://example.com/about");
        assert_eq!(harness.index.upserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_crawler_is_unavailable() {
        let harness = Harness::start(false).await;
        let response = harness
            .post("/api/crawl", json!({"url": "https://example.com"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(harness.crawl_state().await["status"], "error");
    }

    #[tokio::test]
    async fn test_chat_without_key_is_unauthorized() {
        let harness = Harness::start(true).await;
        let response = harness
            .post("/api/chat", json!({"prompt": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.chat.calls.load(Ordering::SeqCst), 0);

        let history: Vec<ChatMessage> = harness
            .get("/api/chat/history")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_chat_streams_reply_and_records_history() {
        let harness = Harness::start(true).await;
        let body = harness
            .post("/api/chat", json!({"api_key": "sk-test", "prompt": "hello"}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("event: chunk"));
        assert!(body.contains(r#"{"text":"You said: "}"#));
        assert!(body.contains("event: done"));
        assert!(body.contains(r#"{"content":"You said: hello"}"#));

        let history: Vec<ChatMessage> = harness
            .get("/api/chat/history")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            history,
            vec![
                ChatMessage::user("hello"),
                ChatMessage::assistant("You said: hello"),
            ]
        );
    }

    #[tokio::test]
    async fn test_ending_session_drops_history() {
        let harness = Harness::start(true).await;
        harness
            .post("/api/chat", json!({"api_key": "k", "prompt": "hi"}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(harness.state.session_count().await, 1);

        let response = harness
            .client
            .delete(harness.url("/api/session"))
            .header(SESSION_HEADER, "test-session")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(harness.state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_history_stays_readable_while_reply_stalls() {
        let harness = Harness::stalled_chat().await;
        let response = harness
            .post("/api/chat", json!({"api_key": "k", "prompt": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let history = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let history: Vec<ChatMessage> = harness
                    .get("/api/chat/history")
                    .send()
                    .await
                    .unwrap()
                    .json()
                    .await
                    .unwrap();
                if !history.is_empty() {
                    return history;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("history request blocked behind the pending reply");

        assert_eq!(history, vec![ChatMessage::user("hello")]);
    }

    fn bare_state(limits: SessionLimits) -> AppState {
        let index = Arc::new(CountingIndex::default()) as Arc<dyn DocumentIndex>;
        let crawler = Crawler::new(None, index);
        let chat = Arc::new(EchoChat {
            calls: AtomicUsize::new(0),
            stall: false,
        });
        let features = Features {
            crawl_enabled: false,
            index_enabled: false,
            collection: None,
            chat_model: "gpt-test".to_string(),
            default_page_limit: 10,
            max_page_limit: 100,
        };
        AppState::new(crawler, chat, features, limits)
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let state = bare_state(SessionLimits {
            ttl: Duration::from_millis(50),
            max_sessions: 1000,
        });

        for i in 0..20 {
            state.session(&format!("tab-{}", i)).await;
        }
        assert_eq!(state.session_count().await, 20);

        tokio::time::sleep(Duration::from_millis(100)).await;
        state.session("tab-new").await;
        assert_eq!(state.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_starts_fresh() {
        let state = bare_state(SessionLimits {
            ttl: Duration::from_millis(50),
            max_sessions: 1000,
        });

        let first = state.session("tab").await;
        assert!(Arc::ptr_eq(&first, &state.session("tab").await));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!Arc::ptr_eq(&first, &state.session("tab").await));
    }

    #[tokio::test]
    async fn test_session_cap_evicts_least_recently_seen() {
        let state = bare_state(SessionLimits {
            ttl: Duration::from_secs(3600),
            max_sessions: 3,
        });

        let kept = state.session("tab-0").await;
        for i in 1..50 {
            state.session(&format!("tab-{}", i)).await;
            tokio::time::sleep(Duration::from_millis(1)).await;
            // tab-0 stays active throughout
            state.session("tab-0").await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(state.session_count().await, 3);
        assert!(Arc::ptr_eq(&kept, &state.session("tab-0").await));
    }
}
