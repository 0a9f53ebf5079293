//! HTTP object fetcher.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::PipelineError;
use crate::fetcher::ObjectFetcher;
use exif_indexer_shared::{ObjectIdentifier, RawObject};

/// Fetches objects with `GET <base_url>/<identifier>`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    /// Create a fetcher for the given catalog base URL.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// URL an identifier is retrieved from.
    pub fn object_url(&self, identifier: &ObjectIdentifier) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), identifier)
    }
}

#[async_trait]
impl ObjectFetcher for HttpFetcher {
    async fn fetch(&self, identifier: &ObjectIdentifier) -> Result<RawObject, PipelineError> {
        let url = self.object_url(identifier);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::fetch(identifier, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(
                identifier,
                format!("GET {} returned status {}", url, status),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::fetch(identifier, e.to_string()))?;

        debug!(identifier = %identifier, size = bytes.len(), "Downloaded object");
        Ok(RawObject::new(identifier.clone(), bytes.to_vec()))
    }
}
