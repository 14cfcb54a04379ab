//! Vector store commands

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{CollectionSpec, VectorDb};
use serde::Serialize;
use tracing::{debug, info};

/// Status of the configured collection
#[derive(Debug, Clone, Serialize)]
pub struct DbStatus {
    pub qdrant_url: Option<String>,
    pub collection_name: String,
    pub dimension: usize,
    pub distance: String,
    pub embedding_model: String,
    pub connected: bool,
    pub collection_exists: bool,
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub collection_status: Option<String>,
}

/// Create the configured collection if it does not exist
///
/// Returns `None` when no store is configured.
pub async fn cmd_db_init(config: &Config) -> Result<Option<CollectionSpec>> {
    let db = VectorDb::from_config(config)?;
    let Some(spec) = db.spec().cloned() else {
        return Ok(None);
    };

    db.create_collection(&spec).await?;
    info!("Collection {} is ready", spec.name);
    Ok(Some(spec))
}

/// Report connection and point counts for the configured collection
pub async fn cmd_db_status(config: &Config) -> Result<DbStatus> {
    let mut status = DbStatus {
        qdrant_url: config.qdrant.url.clone(),
        collection_name: config.qdrant.collection_name.clone(),
        dimension: config.embedding.dimension,
        distance: config.qdrant.distance.to_string(),
        embedding_model: config.embedding.model.clone(),
        connected: false,
        collection_exists: false,
        points_count: 0,
        indexed_vectors_count: 0,
        collection_status: None,
    };

    let db = VectorDb::from_config(config)?;
    match db.collection_info().await {
        Ok(Some(info)) => {
            status.connected = true;
            status.collection_exists = true;
            status.points_count = info.points_count;
            status.indexed_vectors_count = info.indexed_vectors_count;
            status.collection_status = Some(info.status);
        }
        Ok(None) => status.connected = true,
        Err(Error::ConfigurationMissing(_)) => {}
        Err(e) => debug!("Qdrant status error: {}", e),
    }

    Ok(status)
}

/// Print store status to console
pub fn print_db_status(status: &DbStatus) {
    println!("\nVector store\n");
    match &status.qdrant_url {
        Some(url) => println!("  URL: {}", url),
        None => println!("  URL: not set (indexing disabled)"),
    }
    println!("  Collection: {}", status.collection_name);
    println!("  Vectors: {} dims, {}", status.dimension, status.distance);
    println!("  Embedding model: {}", status.embedding_model);

    let configured = status.qdrant_url.is_some();
    let connection = match (configured, status.connected, status.collection_exists) {
        (false, _, _) => "- Not configured",
        (true, false, _) => "✗ Not connected",
        (true, true, false) => "⚠ Connected (collection not created - run 'crawldesk db init')",
        (true, true, true) => "✓ Connected",
    };
    println!("  Status: {}", connection);

    if status.collection_exists {
        println!("  Points: {}", status.points_count);
        println!("  Indexed vectors: {}", status.indexed_vectors_count);
        if let Some(state) = &status.collection_status {
            println!("  Collection state: {}", state);
        }
    }
    println!();
}
