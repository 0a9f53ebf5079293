//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchEngineClient`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    http::StatusCode,
    indices::{IndicesCreateParts, IndicesExistsParts},
    IndexParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::errors::SearchError;
use crate::interfaces::SearchEngineClient;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::types::ClusterHealth;
use exif_indexer_shared::ExifDocument;

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// let client = OpenSearchClient::new("http://localhost:9200", IndexConfig::default()).await?;
/// if client.cluster_health().await?.is_ready() {
///     client.index_document(&document).await?;
/// }
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// No request is sent here; an unreachable cluster surfaces on the first
    /// health check.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index documents are written to
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, index = %index_config.name, "Created OpenSearch client");

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Name of the index this client writes to.
    pub fn index_name(&self) -> &str {
        &self.index_config.name
    }

    /// Extract the `status` member of a `_cluster/health` response body.
    fn parse_health(body: &Value) -> Result<ClusterHealth, SearchError> {
        body.get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| SearchError::health("Health response has no status field"))?
            .parse()
    }

    /// Map a non-success write status to the matching error.
    fn write_error(status: StatusCode, body: String) -> SearchError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            SearchError::rate_limited(format!("Index write throttled: {}", body))
        } else {
            SearchError::index(format!("Index failed with status {}: {}", status, body))
        }
    }
}

#[async_trait]
impl SearchEngineClient for OpenSearchClient {
    async fn cluster_health(&self) -> Result<ClusterHealth, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchError::health(format!(
                "Health request failed with status {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        let health = Self::parse_health(&body)?;
        debug!(status = %health, "Cluster health");
        Ok(health)
    }

    /// Write a document with `PUT <index>/_doc/<identifier>`.
    ///
    /// The body is the metadata map, so the whole document is replaced on
    /// every write.
    #[instrument(skip(self, document), fields(identifier = %document.identifier))]
    async fn index_document(&self, document: &ExifDocument) -> Result<(), SearchError> {
        let body = serde_json::to_value(&document.metadata)
            .map_err(|e| SearchError::SerializationError(e.to_string()))?;

        let response = self
            .client
            .index(IndexParts::IndexId(
                &self.index_config.name,
                document.identifier.as_str(),
            ))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Index request failed");
            return Err(Self::write_error(status, error_body));
        }

        debug!("Document indexed");
        Ok(())
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        let index = self.index_config.name.as_str();

        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if response.status_code().is_success() {
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SearchError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            // Another indexer may have created it between the two requests.
            if error_body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            error!(status = %status, body = %error_body, "Index creation failed");
            return Err(SearchError::index_creation(format!(
                "Create failed with status {}: {}",
                status, error_body
            )));
        }

        info!(index = %index, "Created search index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_health() {
        let body = json!({"cluster_name": "exif", "status": "yellow", "number_of_nodes": 1});
        assert_eq!(
            OpenSearchClient::parse_health(&body).unwrap(),
            ClusterHealth::Yellow
        );
    }

    #[test]
    fn test_parse_health_missing_status() {
        let body = json!({"cluster_name": "exif"});
        assert!(matches!(
            OpenSearchClient::parse_health(&body),
            Err(SearchError::HealthCheckError(_))
        ));
    }

    #[test]
    fn test_write_error_maps_throttling() {
        let err = OpenSearchClient::write_error(StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert!(matches!(err, SearchError::RateLimited(_)));

        let err = OpenSearchClient::write_error(StatusCode::BAD_REQUEST, "bad".into());
        assert!(matches!(err, SearchError::IndexError(_)));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_url() {
        let result = OpenSearchClient::new("not a url", IndexConfig::default()).await;
        assert!(matches!(result, Err(SearchError::ConnectionError(_))));
    }
}
