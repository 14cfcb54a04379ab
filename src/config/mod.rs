//! Configuration management for crawldesk
//!
//! All settings come from the process environment and are read once at
//! startup. Missing service endpoints are not errors: the corresponding
//! feature is disabled and logged.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::store::DistanceMetric;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Crawl service configuration
    pub firecrawl: FirecrawlConfig,

    /// Vector store configuration
    pub qdrant: QdrantConfig,

    /// Embedding backend configuration
    pub embedding: EmbeddingConfig,

    /// Chat completion configuration
    pub chat: ChatConfig,

    /// Dashboard server configuration
    pub dashboard: DashboardConfig,

    /// Log file configuration
    pub logging: LoggingConfig,
}

/// Firecrawl configuration
#[derive(Debug, Clone)]
pub struct FirecrawlConfig {
    /// Base URL of the Firecrawl API (`FIRECRAWL_API_URL`)
    pub api_url: Option<String>,

    /// Optional bearer key (`FIRECRAWL_API_KEY`)
    pub api_key: Option<String>,

    /// Watcher poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Qdrant configuration
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant URL (`QDRANT_URL`)
    pub url: Option<String>,

    /// Optional API key (`QDRANT_API_KEY`)
    pub api_key: Option<String>,

    /// Collection that crawled pages are written to
    pub collection_name: String,

    /// Distance metric used when creating the collection
    pub distance: DistanceMetric,
}

/// Embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Embedding backend base URL
    pub backend_url: String,

    /// Model name/identifier
    pub model: String,

    /// Embedding dimension (must match model)
    pub dimension: usize,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// OpenAI-compatible API base, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Model identifier sent with each request
    pub model: String,

    /// Longest wait for the next piece of a streamed reply
    pub idle_timeout_secs: u64,
}

/// Dashboard configuration
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Socket address the dashboard binds to
    pub bind_addr: String,

    /// Slider default
    pub default_page_limit: u32,

    /// Slider maximum; larger requests are rejected
    pub max_page_limit: u32,

    /// Browser sessions idle for longer than this are forgotten
    pub session_ttl_secs: u64,

    /// Ceiling on live browser sessions; the least recently seen is evicted
    pub max_sessions: usize,
}

/// Log file configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory holding per-component log files
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            firecrawl: FirecrawlConfig::default(),
            qdrant: QdrantConfig::default(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
            dashboard: DashboardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FirecrawlConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_crawl_timeout(),
        }
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            collection_name: default_collection_name(),
            distance: DistanceMetric::Cosine,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend_url: default_embedding_backend_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            model: default_chat_model(),
            idle_timeout_secs: default_chat_idle_timeout(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
            session_ttl_secs: default_session_ttl(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(default_log_dir()),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let firecrawl = FirecrawlConfig {
            api_url: get("FIRECRAWL_API_URL"),
            api_key: get("FIRECRAWL_API_KEY"),
            poll_interval_ms: parse_or(
                "FIRECRAWL_POLL_INTERVAL_MS",
                get("FIRECRAWL_POLL_INTERVAL_MS"),
                default_poll_interval_ms(),
            )?,
            timeout_secs: parse_or(
                "FIRECRAWL_TIMEOUT_SECS",
                get("FIRECRAWL_TIMEOUT_SECS"),
                default_crawl_timeout(),
            )?,
        };

        let distance = get("QDRANT_DISTANCE").unwrap_or_else(default_distance);
        let qdrant = QdrantConfig {
            url: get("QDRANT_URL"),
            api_key: get("QDRANT_API_KEY"),
            collection_name: get("QDRANT_COLLECTION")
                .unwrap_or_else(default_collection_name),
            distance: DistanceMetric::from_str(&distance)?,
        };

        let embedding = EmbeddingConfig {
            backend_url: get("EMBEDDING_BACKEND_URL")
                .unwrap_or_else(default_embedding_backend_url),
            model: get("EMBEDDING_MODEL").unwrap_or_else(default_embedding_model),
            dimension: parse_or(
                "EMBEDDING_DIMENSION",
                get("EMBEDDING_DIMENSION"),
                default_embedding_dimension(),
            )?,
        };

        let chat = ChatConfig {
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(default_chat_base_url),
            model: get("OPENAI_MODEL").unwrap_or_else(default_chat_model),
            idle_timeout_secs: parse_or(
                "OPENAI_IDLE_TIMEOUT_SECS",
                get("OPENAI_IDLE_TIMEOUT_SECS"),
                default_chat_idle_timeout(),
            )?,
        };

        let max_page_limit = parse_or(
            "CRAWLDESK_MAX_PAGES",
            get("CRAWLDESK_MAX_PAGES"),
            default_max_page_limit(),
        )?;
        let dashboard = DashboardConfig {
            bind_addr: get("CRAWLDESK_BIND").unwrap_or_else(default_bind_addr),
            default_page_limit: default_page_limit().min(max_page_limit),
            max_page_limit,
            session_ttl_secs: parse_or(
                "CRAWLDESK_SESSION_TTL_SECS",
                get("CRAWLDESK_SESSION_TTL_SECS"),
                default_session_ttl(),
            )?,
            max_sessions: parse_or(
                "CRAWLDESK_MAX_SESSIONS",
                get("CRAWLDESK_MAX_SESSIONS"),
                default_max_sessions(),
            )?,
        };

        let logging = LoggingConfig {
            log_dir: PathBuf::from(
                get("CRAWLDESK_LOG_DIR").unwrap_or_else(default_log_dir),
            ),
        };

        let config = Self {
            firecrawl,
            qdrant,
            embedding,
            chat,
            dashboard,
            logging,
        };

        debug!(
            crawl_enabled = config.firecrawl.api_url.is_some(),
            index_enabled = config.qdrant.url.is_some(),
            "Loaded configuration"
        );

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.firecrawl.poll_interval_ms == 0 {
            return Err(Error::Config(
                "FIRECRAWL_POLL_INTERVAL_MS must be positive".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "EMBEDDING_DIMENSION must be positive".to_string(),
            ));
        }

        if self.dashboard.max_page_limit == 0 {
            return Err(Error::Config(
                "CRAWLDESK_MAX_PAGES must be at least 1".to_string(),
            ));
        }

        if self.chat.idle_timeout_secs == 0 {
            return Err(Error::Config(
                "OPENAI_IDLE_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        if self.dashboard.session_ttl_secs == 0 || self.dashboard.max_sessions == 0 {
            return Err(Error::Config(
                "CRAWLDESK_SESSION_TTL_SECS and CRAWLDESK_MAX_SESSIONS must be positive"
                    .to_string(),
            ));
        }

        if self.qdrant.collection_name.trim().is_empty() {
            return Err(Error::Config(
                "QDRANT_COLLECTION must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_leave_services_disabled() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.firecrawl.api_url.is_none());
        assert!(config.qdrant.url.is_none());
        assert_eq!(config.qdrant.collection_name, "demo_collection");
        assert_eq!(config.chat.model, "gpt-3.5-turbo");
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.dashboard.default_page_limit, 10);
    }

    #[test]
    fn test_reads_endpoints() {
        let config = Config::from_lookup(lookup(&[
            ("FIRECRAWL_API_URL", "http://localhost:3002"),
            ("QDRANT_URL", "http://localhost:6334"),
            ("QDRANT_DISTANCE", "dot"),
            ("FIRECRAWL_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(
            config.firecrawl.api_url.as_deref(),
            Some("http://localhost:3002")
        );
        assert_eq!(config.qdrant.url.as_deref(), Some("http://localhost:6334"));
        assert_eq!(config.qdrant.distance, DistanceMetric::Dot);
        assert_eq!(config.firecrawl.poll_interval_ms, 250);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = Config::from_lookup(lookup(&[("QDRANT_URL", "   ")])).unwrap();
        assert!(config.qdrant.url.is_none());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err =
            Config::from_lookup(lookup(&[("EMBEDDING_DIMENSION", "lots")])).unwrap_err();
        assert!(err.to_string().contains("EMBEDDING_DIMENSION"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.firecrawl.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.firecrawl.poll_interval_ms = 100;
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_small_max_pages_clamps_default() {
        let config = Config::from_lookup(lookup(&[("CRAWLDESK_MAX_PAGES", "5")])).unwrap();
        assert_eq!(config.dashboard.max_page_limit, 5);
        assert_eq!(config.dashboard.default_page_limit, 5);
    }

    #[test]
    fn test_session_and_stream_limits() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_IDLE_TIMEOUT_SECS", "15"),
            ("CRAWLDESK_SESSION_TTL_SECS", "600"),
        ]))
        .unwrap();
        assert_eq!(config.chat.idle_timeout_secs, 15);
        assert_eq!(config.dashboard.session_ttl_secs, 600);
        assert_eq!(config.dashboard.max_sessions, 1000);

        assert!(Config::from_lookup(lookup(&[("CRAWLDESK_MAX_SESSIONS", "0")])).is_err());
    }
}
