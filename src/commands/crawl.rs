//! Headless crawl command
//!
//! Runs the same ingesting crawl as the dashboard, with a terminal progress
//! bar in place of the browser.

use crate::config::Config;
use crate::crawl::{
    CrawlHandler, CrawlRequest, CrawlSession, CrawlSummary, Crawler, IngestHandler,
    ScrapedDocument,
};
use crate::error::{Error, Result};
use crate::progress::crawl_progress_bar;
use crate::store::{DocumentIndex, VectorDb};
use async_trait::async_trait;
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub url: String,
    pub limit: u32,
}

/// Ingests like the dashboard and ticks a progress bar per page
pub struct ProgressHandler {
    inner: IngestHandler,
    bar: ProgressBar,
}

impl ProgressHandler {
    pub fn new(inner: IngestHandler, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }
}

#[async_trait]
impl CrawlHandler for ProgressHandler {
    async fn on_document(&self, document: ScrapedDocument) {
        self.bar.set_message(document.url.clone());
        self.inner.on_document(document).await;
        self.bar.inc(1);
    }

    async fn on_error(&self, message: String) {
        self.inner.on_error(message).await;
    }

    async fn on_done(&self, status: String) {
        self.bar.set_message(status.clone());
        self.inner.on_done(status).await;
    }
}

/// Crawl a site and index every page
pub async fn cmd_crawl(config: &Config, options: CrawlOptions) -> Result<CrawlSummary> {
    if options.limit > config.dashboard.max_page_limit {
        return Err(Error::InvalidInput(format!(
            "Page limit must be between 1 and {}",
            config.dashboard.max_page_limit
        )));
    }
    let request = CrawlRequest::new(&options.url, options.limit)?;

    let index = Arc::new(VectorDb::from_config(config)?);
    if let Err(e) = index.ensure_collection().await {
        warn!("Could not prepare collection: {}", e);
    }

    let crawler = Crawler::from_config(config, index as Arc<dyn DocumentIndex>)?;
    let session = CrawlSession::new();
    let handler = ProgressHandler::new(
        crawler.ingest_handler(session.clone()),
        crawl_progress_bar(request.page_limit()),
    );

    let result = crawler.run(&request, &session, &handler).await;
    handler.bar.finish_and_clear();

    let summary = result?;
    info!(
        "Crawl {} finished with status '{}' after {} pages",
        summary.job_id, summary.status, summary.pages
    );
    Ok(summary)
}

/// Print a crawl summary to the console
pub fn print_summary(summary: &CrawlSummary) {
    let marker = if summary.succeeded() { "✓" } else { "✗" };
    println!(
        "{} Crawl {} {}: {} pages indexed",
        marker, summary.job_id, summary.status, summary.pages
    );
}
