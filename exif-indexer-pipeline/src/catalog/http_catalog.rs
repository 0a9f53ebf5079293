//! HTTP catalog backed by an S3-style XML bucket listing.

use std::collections::HashSet;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, instrument};

use crate::catalog::CatalogLister;
use crate::errors::PipelineError;
use crate::retry::{retry, RetryPolicy};
use exif_indexer_shared::ObjectIdentifier;

/// Element holding object keys in an S3 `ListBucketResult`.
pub const DEFAULT_KEY_TAG: &str = "Key";

#[derive(Error, Debug)]
enum ListingError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Listing returned status {0}")]
    Status(StatusCode),

    #[error("Invalid listing: {0}")]
    Parse(String),
}

impl ListingError {
    fn is_transient(&self) -> bool {
        match self {
            ListingError::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            ListingError::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ListingError::Parse(_) => false,
        }
    }
}

/// Lists identifiers from an HTTP endpoint returning an XML document.
pub struct HttpCatalog {
    client: reqwest::Client,
    url: String,
    key_tag: String,
    retry: RetryPolicy,
}

impl HttpCatalog {
    /// Create a new catalog lister.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `url` - Listing URL (the catalog base URL for S3 buckets)
    /// * `key_tag` - Local name of the element holding each identifier
    /// * `retry` - Policy applied to connection failures, throttling and 5xx answers
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        key_tag: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            key_tag: key_tag.into(),
            retry,
        }
    }

    async fn fetch_listing(&self) -> Result<Vec<ObjectIdentifier>, ListingError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status(status));
        }

        let body = response.text().await?;
        parse_identifiers(&body, &self.key_tag).map_err(ListingError::Parse)
    }
}

#[async_trait]
impl CatalogLister for HttpCatalog {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn list_identifiers(&self) -> Result<Vec<ObjectIdentifier>, PipelineError> {
        let identifiers = retry(
            &self.retry,
            |_| self.fetch_listing(),
            ListingError::is_transient,
        )
        .await
        .map_err(|e| PipelineError::catalog(e.to_string()))?;

        info!(count = identifiers.len(), "Listed catalog identifiers");
        Ok(identifiers)
    }
}

/// Extract the text of every element whose local name is `key_tag`.
///
/// Namespaces are ignored, empty keys are skipped and repeated keys are kept
/// once, in first-seen order.
pub fn parse_identifiers(xml: &str, key_tag: &str) -> Result<Vec<ObjectIdentifier>, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut identifiers = Vec::new();
    let mut seen = HashSet::new();
    let mut in_key = false;

    loop {
        let text = match reader.read_event() {
            Ok(Event::Start(e)) => {
                in_key = e.local_name().as_ref() == key_tag.as_bytes();
                continue;
            }
            Ok(Event::End(_)) => {
                in_key = false;
                continue;
            }
            Ok(Event::Text(t)) if in_key => t
                .unescape()
                .map_err(|e| format!("Invalid key text: {}", e))?
                .into_owned(),
            Ok(Event::CData(c)) if in_key => String::from_utf8_lossy(&c.into_inner()).into_owned(),
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(e) => {
                return Err(format!(
                    "Malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        };

        if !text.is_empty() && seen.insert(text.clone()) {
            identifiers.push(ObjectIdentifier::new(text));
        }
    }

    Ok(identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>images</Name>
  <IsTruncated>false</IsTruncated>
  <Contents>
    <Key>a.jpg</Key>
    <LastModified>2016-03-01T00:00:00.000Z</LastModified>
    <Size>1024</Size>
  </Contents>
  <Contents>
    <Key>b&amp;c.jpg</Key>
    <Size>2048</Size>
  </Contents>
</ListBucketResult>"#;

    #[test]
    fn test_parse_bucket_listing() {
        let ids = parse_identifiers(LISTING, DEFAULT_KEY_TAG).unwrap();
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["a.jpg", "b&c.jpg"]);
    }

    #[test]
    fn test_parse_ignores_other_tags() {
        let ids = parse_identifiers(LISTING, "Name").unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), "images");
    }

    #[test]
    fn test_parse_skips_empty_and_duplicate_keys() {
        let xml = "<r><Key>a.jpg</Key><Key></Key><Key>a.jpg</Key><Key>b.jpg</Key></r>";
        let ids = parse_identifiers(xml, "Key").unwrap();
        assert_eq!(ids, vec![ObjectIdentifier::from("a.jpg"), ObjectIdentifier::from("b.jpg")]);
    }

    #[test]
    fn test_parse_empty_listing() {
        let ids = parse_identifiers("<ListBucketResult></ListBucketResult>", "Key").unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_parse_malformed_xml() {
        assert!(parse_identifiers("<r><Key>a.jpg</r>", "Key").is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(ListingError::Status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(ListingError::Status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!ListingError::Status(StatusCode::FORBIDDEN).is_transient());
        assert!(!ListingError::Parse("bad".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_unavailable() {
        let delay = std::time::Duration::from_millis(1);
        let catalog = HttpCatalog::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/",
            DEFAULT_KEY_TAG,
            RetryPolicy::exponential(2, delay, delay),
        );

        let err = catalog.list_identifiers().await.unwrap_err();
        assert!(matches!(err, PipelineError::CatalogUnavailable(_)));
        assert!(err.is_fatal());
    }
}
