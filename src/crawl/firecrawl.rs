//! Firecrawl v1 backend
//!
//! The hosted SDK watches jobs over a websocket; this backend polls the
//! job's status and errors endpoints instead and turns every poll into the
//! events not yet delivered.

use super::{CrawlBackend, CrawlEvent, CrawlJob, CrawlRequest, ScrapedDocument};
use crate::config::FirecrawlConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

/// Statuses after which a job produces no more data
const TERMINAL_STATUSES: &[&str] = &["completed", "failed", "cancelled"];

/// Upper bound on `next` pages followed during a single poll
const MAX_PAGES_PER_POLL: usize = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartCrawlBody<'a> {
    url: &'a str,
    limit: u32,
    scrape_options: ScrapeOptions,
}

#[derive(Debug, Serialize)]
struct ScrapeOptions {
    formats: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct StartCrawlResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlStatusResponse {
    status: String,
    #[serde(default)]
    data: Vec<FirecrawlDocument>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FirecrawlDocument {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl FirecrawlDocument {
    fn into_scraped(self) -> ScrapedDocument {
        let url = ["url", "sourceURL"]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        ScrapedDocument {
            url,
            markdown: self.markdown.unwrap_or_default(),
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CrawlErrorsResponse {
    #[serde(default)]
    errors: Vec<CrawlErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CrawlErrorEntry {
    #[serde(default)]
    url: Option<String>,
    error: String,
}

impl CrawlErrorEntry {
    fn message(&self) -> String {
        match &self.url {
            Some(url) => format!("{}: {}", url, self.error),
            None => self.error.clone(),
        }
    }
}

/// Everything a single poll learned about a job
#[derive(Debug)]
struct CrawlSnapshot {
    status: String,
    documents: Vec<FirecrawlDocument>,
    errors: Vec<CrawlErrorEntry>,
}

/// Firecrawl API client
#[derive(Clone)]
pub struct FirecrawlClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl FirecrawlClient {
    /// Create a client for the given API base URL
    pub fn new(api_url: &str, config: &FirecrawlConfig) -> Result<Self> {
        Url::parse(api_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Crawl(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Create a client from configuration, or `None` when no API URL is set
    pub fn from_config(config: &FirecrawlConfig) -> Result<Option<Self>> {
        match config.api_url.as_deref() {
            Some(url) => {
                debug!("Initializing Firecrawl client for {}", url);
                Ok(Some(Self::new(url, config)?))
            }
            None => {
                error!("FIRECRAWL_API_URL is not set");
                Ok(None)
            }
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/v1/crawl/{}", self.base_url, job_id)
    }

    async fn checked(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Crawl(format!("HTTP {}: {}", status, body.trim())))
    }

    async fn fetch_status_page(&self, url: &str) -> Result<CrawlStatusResponse> {
        let response = self.authorize(self.client.get(url)).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn fetch_errors(&self, job_id: &str) -> Result<CrawlErrorsResponse> {
        let url = format!("{}/errors", self.job_url(job_id));
        let response = self.authorize(self.client.get(url)).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn poll(&self, job_id: &str) -> Result<CrawlSnapshot> {
        let first = self.fetch_status_page(&self.job_url(job_id)).await?;
        let status = first.status;
        let mut documents = first.data;
        let mut next = first.next;
        let mut pages = 1;

        while let Some(url) = next.take() {
            if pages >= MAX_PAGES_PER_POLL {
                warn!("Stopped following crawl pages for job {} after {}", job_id, pages);
                break;
            }
            let page = self.fetch_status_page(&url).await?;
            documents.extend(page.data);
            next = page.next;
            pages += 1;
        }

        // Not every deployment exposes the errors endpoint.
        let errors = match self.fetch_errors(job_id).await {
            Ok(response) => response.errors,
            Err(e) => {
                debug!("Could not fetch crawl errors for job {}: {}", job_id, e);
                Vec::new()
            }
        };

        Ok(CrawlSnapshot {
            status,
            documents,
            errors,
        })
    }
}

#[async_trait]
impl CrawlBackend for FirecrawlClient {
    async fn start(&self, request: &CrawlRequest) -> Result<CrawlJob> {
        let body = StartCrawlBody {
            url: request.url(),
            limit: request.page_limit(),
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };

        let url = format!("{}/v1/crawl", self.base_url);
        let response = self
            .authorize(self.client.post(url).json(&body))
            .send()
            .await?;
        let parsed: StartCrawlResponse = Self::checked(response).await?.json().await?;

        match parsed.id {
            Some(id) => {
                debug!("Started crawl job {} for {}", id, request.url());
                Ok(CrawlJob { id })
            }
            None => Err(Error::Crawl(
                parsed
                    .error
                    .unwrap_or_else(|| "Crawl service returned no job id".to_string()),
            )),
        }
    }

    fn watch(&self, job: &CrawlJob) -> BoxStream<'static, Result<CrawlEvent>> {
        let state = WatchState {
            client: self.clone(),
            job_id: job.id.clone(),
            emitted_documents: 0,
            emitted_errors: 0,
            pending: VecDeque::new(),
            polled: false,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((Ok(event), state));
                }
                if state.finished {
                    return None;
                }

                if state.polled {
                    tokio::time::sleep(state.client.poll_interval).await;
                }
                state.polled = true;

                match state.client.poll(&state.job_id).await {
                    Ok(snapshot) => state.absorb(snapshot),
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }
        })
        .boxed()
    }
}

struct WatchState {
    client: FirecrawlClient,
    job_id: String,
    emitted_documents: usize,
    emitted_errors: usize,
    pending: VecDeque<CrawlEvent>,
    polled: bool,
    finished: bool,
}

impl WatchState {
    /// Queue whatever the snapshot holds beyond what was already emitted
    fn absorb(&mut self, snapshot: CrawlSnapshot) {
        for entry in snapshot.errors.iter().skip(self.emitted_errors) {
            self.pending.push_back(CrawlEvent::Error {
                message: entry.message(),
            });
        }
        self.emitted_errors = self.emitted_errors.max(snapshot.errors.len());

        let total = snapshot.documents.len();
        for document in snapshot.documents.into_iter().skip(self.emitted_documents) {
            self.pending
                .push_back(CrawlEvent::Document(document.into_scraped()));
        }
        self.emitted_documents = self.emitted_documents.max(total);

        if TERMINAL_STATUSES.contains(&snapshot.status.as_str()) {
            self.pending.push_back(CrawlEvent::Done {
                status: snapshot.status,
            });
            self.finished = true;
        }
    }
}
