//! Per-session crawl state shown by the dashboard

use super::CrawlRequest;
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Terminal status string reported by the crawl service on success
pub const COMPLETED_STATUS: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    #[default]
    Idle,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSessionState {
    pub status: CrawlStatus,
    pub url: Option<String>,
    pub page_limit: u32,
    /// One display line per scraped page, in arrival order
    pub results: Vec<String>,
    pub errors: Vec<String>,
    /// Latest human-readable notice
    pub message: Option<String>,
}

impl CrawlSessionState {
    /// Approximate progress in `[0, 1]`
    pub fn progress(&self) -> f32 {
        if self.page_limit == 0 {
            return 0.0;
        }
        (self.results.len() as f32 / self.page_limit as f32).min(1.0)
    }
}

/// Shared handle to one session's crawl state
#[derive(Debug, Clone, Default)]
pub struct CrawlSession {
    state: Arc<RwLock<CrawlSessionState>>,
}

impl CrawlSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the state for a new request and mark it running
    ///
    /// Fails with [`Error::CrawlInProgress`] while a crawl is still running,
    /// so two jobs never write into the same state.
    pub async fn begin(&self, request: &CrawlRequest) -> Result<()> {
        let mut state = self.state.write().await;
        if state.status == CrawlStatus::Running {
            return Err(Error::CrawlInProgress);
        }

        *state = CrawlSessionState {
            status: CrawlStatus::Running,
            url: Some(request.url().to_string()),
            page_limit: request.page_limit(),
            results: Vec::new(),
            errors: Vec::new(),
            message: Some(format!("Starting crawl of {}...", request.url())),
        };
        Ok(())
    }

    pub async fn record_page(&self, url: &str) {
        let mut state = self.state.write().await;
        state.results.push(format!("Scraped: {}", url));
        state.message = Some(format!(
            "Currently crawling: {} ({} pages so far)",
            url,
            state.results.len()
        ));
    }

    pub async fn record_error(&self, message: &str) {
        self.state.write().await.errors.push(message.to_string());
    }

    /// Apply a terminal status from the crawl service
    pub async fn finish(&self, status: &str) -> CrawlStatus {
        let mut state = self.state.write().await;
        let pages = state.results.len();
        let url = state.url.clone().unwrap_or_default();

        if status == COMPLETED_STATUS {
            state.status = CrawlStatus::Complete;
            state.message = Some(format!(
                "Crawling of {} complete! Processed {} pages.",
                url, pages
            ));
        } else {
            state.status = CrawlStatus::Error;
            state.message = Some(format!(
                "Crawling of {} ended with status '{}' after {} pages.",
                url, status, pages
            ));
        }
        state.status
    }

    /// Mark the crawl failed with a notice for the user
    pub async fn fail(&self, message: impl Into<String>) {
        let mut state = self.state.write().await;
        state.status = CrawlStatus::Error;
        state.message = Some(message.into());
    }

    pub async fn status(&self) -> CrawlStatus {
        self.state.read().await.status
    }

    pub async fn snapshot(&self) -> CrawlSessionState {
        self.state.read().await.clone()
    }
}
