//! crawldesk: a two-tab dashboard for streaming chat and crawl ingestion
//!
//! Chat turns go to an OpenAI-compatible completion API. Crawls run on a
//! Firecrawl service and every scraped page is embedded and upserted into a
//! Qdrant collection.

pub mod chat;
pub mod commands;
pub mod config;
pub mod crawl;
pub mod dashboard;
pub mod embed;
pub mod error;
pub mod logging;
pub mod progress;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
