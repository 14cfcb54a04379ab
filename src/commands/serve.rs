//! Serve command implementation

use crate::config::Config;
use crate::dashboard;
use crate::error::Result;
use tracing::info;

/// Run the dashboard until interrupted
pub async fn cmd_serve(config: &Config) -> Result<()> {
    info!(
        crawl_enabled = config.firecrawl.api_url.is_some(),
        index_enabled = config.qdrant.url.is_some(),
        "Starting dashboard"
    );
    dashboard::serve(config).await
}
