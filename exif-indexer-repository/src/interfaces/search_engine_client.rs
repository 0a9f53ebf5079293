//! Search engine client trait definition.
//!
//! This module defines the abstract interface for search engine operations,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;

use crate::errors::SearchError;
use crate::types::ClusterHealth;
use exif_indexer_shared::ExifDocument;

/// Abstract interface for search engine operations.
///
/// Implementations can be swapped for different backends (OpenSearch, mock, etc.)
/// enabling easy testing without a live cluster.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait SearchEngineClient: Send + Sync {
    /// Check the cluster health.
    ///
    /// # Returns
    ///
    /// * `Ok(ClusterHealth)` - The severity level reported by the cluster
    /// * `Err(SearchError)` - If the cluster could not be reached or the response was malformed
    async fn cluster_health(&self) -> Result<ClusterHealth, SearchError>;

    /// Write a document keyed by its identifier.
    ///
    /// If a document with the same identifier already exists, it is replaced.
    /// Writing the same document twice is therefore a no-op difference.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the write was acknowledged by the cluster
    /// * `Err(SearchError::RateLimited)` - If the cluster throttled the request
    /// * `Err(SearchError)` - For any other failure
    async fn index_document(&self, document: &ExifDocument) -> Result<(), SearchError>;

    /// Ensure the search index exists, creating it if necessary.
    async fn ensure_index_exists(&self) -> Result<(), SearchError>;
}
