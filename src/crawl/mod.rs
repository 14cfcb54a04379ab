//! Crawl orchestration over a remote crawl service
//!
//! This module provides:
//! - The request/event types exchanged with the crawl service
//! - [`CrawlBackend`], the transport that starts a job and watches it
//! - [`CrawlHandler`], the three handler slots a watcher dispatches to
//! - A Firecrawl polling backend and the ingesting orchestrator

mod firecrawl;
mod orchestrator;
mod session;

pub use firecrawl::*;
pub use orchestrator::*;
pub use session::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use url::Url;

/// A validated request to crawl one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    url: String,
    page_limit: u32,
}

impl CrawlRequest {
    pub fn new(url: &str, page_limit: u32) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("Please enter a valid URL".to_string()));
        }

        // Bare hosts like `example.com` are crawled over http.
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };

        let parsed = Url::parse(&url)
            .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidInput(format!(
                "Only http and https URLs can be crawled, got '{}'",
                parsed.scheme()
            )));
        }

        if page_limit == 0 {
            return Err(Error::InvalidInput(
                "Page limit must be at least 1".to_string(),
            ));
        }

        Ok(Self { url, page_limit })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }
}

/// A page delivered by the crawl service
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedDocument {
    pub url: String,
    pub markdown: String,
    pub metadata: Map<String, Value>,
}

/// One lifecycle event of a crawl job
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    Document(ScrapedDocument),
    Error { message: String },
    Done { status: String },
}

/// Handle to a job started on the crawl service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlJob {
    pub id: String,
}

/// Transport to a crawl service
#[async_trait]
pub trait CrawlBackend: Send + Sync {
    /// Open a crawl job
    async fn start(&self, request: &CrawlRequest) -> Result<CrawlJob>;

    /// Watch a job; yields documents and errors, then exactly one `Done`.
    ///
    /// An `Err` item means the connection to the service failed and the
    /// stream is over.
    fn watch(&self, job: &CrawlJob) -> BoxStream<'static, Result<CrawlEvent>>;
}

/// The three slots a watcher delivers events to
#[async_trait]
pub trait CrawlHandler: Send + Sync {
    async fn on_document(&self, document: ScrapedDocument);

    async fn on_error(&self, message: String);

    async fn on_done(&self, status: String);
}

/// Route one event to its handler slot, returning the terminal status on `Done`
pub async fn dispatch(handler: &dyn CrawlHandler, event: CrawlEvent) -> Option<String> {
    match event {
        CrawlEvent::Document(document) => {
            handler.on_document(document).await;
            None
        }
        CrawlEvent::Error { message } => {
            handler.on_error(message).await;
            None
        }
        CrawlEvent::Done { status } => {
            handler.on_done(status.clone()).await;
            Some(status)
        }
    }
}
