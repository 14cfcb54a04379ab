//! Crawl-to-index pipeline

use super::{
    dispatch, CrawlBackend, CrawlHandler, CrawlRequest, CrawlSession, FirecrawlClient,
    ScrapedDocument, COMPLETED_STATUS,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{DocumentIndex, IndexedDocument};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of a crawl that reached its done event
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub job_id: String,
    pub status: String,
    pub pages: usize,
}

impl CrawlSummary {
    pub fn succeeded(&self) -> bool {
        self.status == COMPLETED_STATUS
    }
}

/// Default handler: index every page and mirror progress into the session
pub struct IngestHandler {
    index: Arc<dyn DocumentIndex>,
    session: CrawlSession,
}

impl IngestHandler {
    pub fn new(index: Arc<dyn DocumentIndex>, session: CrawlSession) -> Self {
        Self { index, session }
    }
}

#[async_trait]
impl CrawlHandler for IngestHandler {
    async fn on_document(&self, document: ScrapedDocument) {
        debug!("Scraped: {}", document.url);

        let url = document.url;
        let indexed = IndexedDocument::new(document.markdown, document.metadata);
        let id = indexed.id;
        if let Err(e) = self.index.upsert(indexed).await {
            // A broken store drops the page but never stops the crawl.
            warn!(%id, "Failed to index {}: {}", url, e);
        }

        self.session.record_page(&url).await;
    }

    async fn on_error(&self, message: String) {
        error!("{}", message);
        self.session.record_error(&message).await;
    }

    async fn on_done(&self, status: String) {
        info!("DONE {}", status);
        self.session.finish(&status).await;
    }
}

/// Starts crawl jobs and feeds their events to handlers
pub struct Crawler {
    backend: Option<Arc<dyn CrawlBackend>>,
    index: Arc<dyn DocumentIndex>,
}

impl Crawler {
    pub fn new(backend: Option<Arc<dyn CrawlBackend>>, index: Arc<dyn DocumentIndex>) -> Self {
        Self { backend, index }
    }

    /// Build with the Firecrawl backend; crawling is disabled without an API URL
    pub fn from_config(config: &Config, index: Arc<dyn DocumentIndex>) -> Result<Self> {
        let backend = FirecrawlClient::from_config(&config.firecrawl)?
            .map(|client| Arc::new(client) as Arc<dyn CrawlBackend>);
        Ok(Self::new(backend, index))
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn ingest_handler(&self, session: CrawlSession) -> IngestHandler {
        IngestHandler::new(Arc::clone(&self.index), session)
    }

    /// Crawl and index a site, reflecting progress into `session`
    pub async fn crawl(
        &self,
        request: &CrawlRequest,
        session: &CrawlSession,
    ) -> Result<CrawlSummary> {
        let handler = self.ingest_handler(session.clone());
        self.run(request, session, &handler).await
    }

    /// Crawl with a caller-supplied handler
    ///
    /// Returns once the done event has been handled. A failed poll, or a
    /// watcher that closes without a done event, marks the session `error`.
    pub async fn run(
        &self,
        request: &CrawlRequest,
        session: &CrawlSession,
        handler: &dyn CrawlHandler,
    ) -> Result<CrawlSummary> {
        let backend = self.claim(request, session).await?;
        drive(backend.as_ref(), request, session, handler).await
    }

    /// Start an ingesting crawl on a background task
    ///
    /// The session is claimed before this returns, so configuration errors
    /// and [`Error::CrawlInProgress`] are reported to the caller directly.
    pub async fn spawn(
        &self,
        request: CrawlRequest,
        session: CrawlSession,
    ) -> Result<JoinHandle<Result<CrawlSummary>>> {
        let backend = self.claim(&request, &session).await?;
        let handler = self.ingest_handler(session.clone());

        Ok(tokio::spawn(async move {
            drive(backend.as_ref(), &request, &session, &handler).await
        }))
    }

    /// Mark the session running and hand out the backend
    async fn claim(
        &self,
        request: &CrawlRequest,
        session: &CrawlSession,
    ) -> Result<Arc<dyn CrawlBackend>> {
        session.begin(request).await?;

        match &self.backend {
            Some(backend) => Ok(Arc::clone(backend)),
            None => {
                error!("Crawl service not initialized. Check FIRECRAWL_API_URL.");
                session
                    .fail("The crawler is not available. Check the server configuration.")
                    .await;
                Err(Error::ConfigurationMissing("FIRECRAWL_API_URL"))
            }
        }
    }
}

async fn drive(
    backend: &dyn CrawlBackend,
    request: &CrawlRequest,
    session: &CrawlSession,
    handler: &dyn CrawlHandler,
) -> Result<CrawlSummary> {
    info!(
        "Starting crawl of {} (limit {})",
        request.url(),
        request.page_limit()
    );

    let job = match backend.start(request).await {
        Ok(job) => job,
        Err(e) => {
            error!("Failed to start crawl of {}: {}", request.url(), e);
            session
                .fail(format!("Error crawling {}: {}", request.url(), e))
                .await;
            return Err(e);
        }
    };

    let mut events = backend.watch(&job);
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                error!("Lost connection to crawl job {}: {}", job.id, e);
                session
                    .fail(format!("Error crawling {}: {}", request.url(), e))
                    .await;
                return Err(e);
            }
        };

        if let Some(status) = dispatch(handler, event).await {
            let pages = session.snapshot().await.results.len();
            return Ok(CrawlSummary {
                job_id: job.id,
                status,
                pages,
            });
        }
    }

    error!("Watcher for crawl job {} closed before completion", job.id);
    session
        .fail(format!(
            "Error crawling {}: the crawl service stopped reporting progress",
            request.url()
        ))
        .await;
    Err(Error::Crawl(format!(
        "Watcher for job {} closed before completion",
        job.id
    )))
}
