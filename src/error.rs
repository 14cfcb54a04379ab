//! Custom error types for crawldesk

use thiserror::Error;

/// Main error type for crawldesk operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} is not set")]
    ConfigurationMissing(&'static str),

    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("No API key supplied")]
    AuthenticationMissing,

    #[error("A crawl is already running for this session")]
    CrawlInProgress,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for crawldesk
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}
