//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client and provides:
//! - Collection management
//! - Single-document upsert (embedding delegated to [`crate::embed`])
//! - A disabled mode used when `QDRANT_URL` is unset

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::embed::{create_embedder, Embedder};
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, GetCollectionInfoResponse, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info};

/// Distance metric for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclid,
    Manhattan,
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "euclid" | "euclidean" => Ok(Self::Euclid),
            "manhattan" => Ok(Self::Manhattan),
            _ => Err(Error::Config(format!(
                "Unsupported distance metric '{}'; expected cosine, dot, euclid or manhattan",
                value
            ))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::Euclid => "euclid",
            Self::Manhattan => "manhattan",
        };
        f.write_str(name)
    }
}

impl From<DistanceMetric> for Distance {
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::Dot => Distance::Dot,
            DistanceMetric::Euclid => Distance::Euclid,
            DistanceMetric::Manhattan => Distance::Manhattan,
        }
    }
}

/// Name, vector size and metric of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub distance: DistanceMetric,
}

/// Information about a Qdrant collection
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// Anything crawled documents can be written to
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Store one document; the caller cannot tell "stored" from "enqueued"
    async fn upsert(&self, document: IndexedDocument) -> Result<()>;
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    spec: CollectionSpec,
    embedder: Box<dyn Embedder>,
}

impl QdrantStore {
    /// Create a new store connection
    ///
    /// The client connects lazily; nothing is sent until the first call.
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        spec: CollectionSpec,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self> {
        debug!("Initializing Qdrant client for {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build().map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            spec,
            embedder,
        })
    }

    /// Collection this store writes to
    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    /// Ensure a collection exists with the given configuration
    pub async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&spec.name)
            .await
            .map_err(|e| Error::ConnectionUnavailable(e.to_string()))?;

        if exists {
            debug!("Collection {} already exists", spec.name);

            let info = self.client.collection_info(&spec.name).await?;
            if let Some(size) = extract_vector_size(&info) {
                if size as usize != spec.dimension {
                    return Err(Error::Qdrant(format!(
                        "Collection '{}' has vector size {}, but {} was requested",
                        spec.name, size, spec.dimension
                    )));
                }
            }
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {} ({})",
            spec.name, spec.dimension, spec.distance
        );

        let vectors_config =
            VectorParamsBuilder::new(spec.dimension as u64, Distance::from(spec.distance));

        self.client
            .create_collection(CreateCollectionBuilder::new(&spec.name).vectors_config(vectors_config))
            .await?;

        info!("Collection {} created successfully", spec.name);
        Ok(())
    }

    /// Get collection info (point count, etc)
    pub async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        let exists = self
            .client
            .collection_exists(&self.spec.name)
            .await
            .map_err(|e| Error::ConnectionUnavailable(e.to_string()))?;
        if !exists {
            return Ok(None);
        }

        let info = self.client.collection_info(&self.spec.name).await?;
        Ok(info.result.map(|result| CollectionInfo {
            points_count: result.points_count.unwrap_or(0),
            indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
            status: format!("{:?}", result.status()),
        }))
    }

    /// Embed and upsert a single document
    pub async fn upsert(&self, document: &IndexedDocument) -> Result<()> {
        let vector = self.embedder.embed_one(document.document.clone()).await?;

        if vector.len() != self.spec.dimension {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': model '{}' produced {}, expected {}",
                self.spec.name,
                self.embedder.model_name(),
                vector.len(),
                self.spec.dimension
            )));
        }

        debug!(
            "Adding document {} to collection {}",
            document.id, self.spec.name
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(
                &self.spec.name,
                vec![document.to_point_struct(vector)],
            ))
            .await?;

        Ok(())
    }
}

fn extract_vector_size(info: &GetCollectionInfoResponse) -> Option<u64> {
    let result = info.result.as_ref()?;
    let config = result.config.as_ref()?;
    let params = config.params.as_ref()?;
    let vectors_config = params.vectors_config.as_ref()?;

    match vectors_config.config.as_ref()? {
        qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size),
        qdrant_client::qdrant::vectors_config::Config::ParamsMap(_) => None,
    }
}

/// Vector store facade
///
/// Holds no client when `QDRANT_URL` is unset; every operation then logs and
/// returns successfully without touching the network.
pub struct VectorDb {
    store: Option<QdrantStore>,
}

impl VectorDb {
    /// Build from configuration, disabled when no URL is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let Some(url) = config.qdrant.url.as_deref() else {
            error!("QDRANT_URL is not set");
            return Ok(Self::disabled());
        };

        // The collection is sized by the embedder that fills it.
        let embedder = create_embedder(&config.embedding)?;
        let spec = CollectionSpec {
            name: config.qdrant.collection_name.clone(),
            dimension: embedder.dimension(),
            distance: config.qdrant.distance,
        };
        let store = QdrantStore::new(url, config.qdrant.api_key.as_deref(), spec, embedder)?;

        Ok(Self::with_store(store))
    }

    /// A facade that never contacts a store
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn with_store(store: QdrantStore) -> Self {
        Self { store: Some(store) }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// The configured collection, if enabled
    pub fn spec(&self) -> Option<&CollectionSpec> {
        self.store.as_ref().map(QdrantStore::spec)
    }

    /// Idempotently create a collection
    pub async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let Some(store) = &self.store else {
            error!("QdrantClient is not initialized");
            return Ok(());
        };
        store.create_collection(spec).await
    }

    /// Create the configured collection
    pub async fn ensure_collection(&self) -> Result<()> {
        let Some(store) = &self.store else {
            error!("QdrantClient is not initialized");
            return Ok(());
        };
        let spec = store.spec().clone();
        store.create_collection(&spec).await
    }

    pub async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        match &self.store {
            Some(store) => store.collection_info().await,
            None => Err(Error::ConfigurationMissing("QDRANT_URL")),
        }
    }
}

#[async_trait]
impl DocumentIndex for VectorDb {
    async fn upsert(&self, document: IndexedDocument) -> Result<()> {
        let Some(store) = &self.store else {
            error!("QdrantClient is not initialized");
            return Ok(());
        };
        store.upsert(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    struct FixedEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn spec(dimension: usize) -> CollectionSpec {
        CollectionSpec {
            name: "test_collection".to_string(),
            dimension,
            distance: DistanceMetric::Cosine,
        }
    }

    #[test]
    fn test_distance_parsing() {
        assert_eq!("Cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("euclidean".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclid);
        assert!("hamming".parse::<DistanceMetric>().is_err());
        assert_eq!(Distance::from(DistanceMetric::Dot), Distance::Dot);
    }

    #[test]
    fn test_from_config_without_url_is_disabled() {
        let db = VectorDb::from_config(&Config::default()).unwrap();
        assert!(!db.is_enabled());
        assert!(db.spec().is_none());
    }

    #[tokio::test]
    async fn test_collection_is_sized_by_embedder() {
        let config = Config::from_lookup(|key| match key {
            "QDRANT_URL" => Some("http://127.0.0.1:6334".to_string()),
            "EMBEDDING_DIMENSION" => Some("768".to_string()),
            _ => None,
        })
        .unwrap();

        let db = VectorDb::from_config(&config).unwrap();
        let spec = db.spec().unwrap();
        assert_eq!(spec.dimension, 768);
        assert_eq!(spec.name, "demo_collection");
    }

    #[tokio::test]
    async fn test_disabled_store_is_a_silent_noop() {
        let db = VectorDb::disabled();
        let doc = IndexedDocument::new("text".to_string(), Map::new());

        assert!(db.upsert(doc).await.is_ok());
        assert!(db.create_collection(&spec(3)).await.is_ok());
        assert!(db.ensure_collection().await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_store_has_no_collection_info() {
        let err = VectorDb::disabled().collection_info().await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationMissing("QDRANT_URL")));
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let store = QdrantStore::new(
            "http://127.0.0.1:6334",
            None,
            spec(3),
            Box::new(FixedEmbedder { dimension: 2 }),
        )
        .expect("store should initialize");

        let doc = IndexedDocument::new("text".to_string(), Map::new());
        let err = store
            .upsert(&doc)
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::Qdrant(message) => assert!(message.contains("Vector dimension mismatch")),
            other => panic!("expected qdrant error, got {other:?}"),
        }
    }
}
