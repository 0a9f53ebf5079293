//! Catalog module for the EXIF indexer pipeline.
//!
//! Enumerates the object identifiers a run has to process.

mod http_catalog;

use async_trait::async_trait;

use crate::errors::PipelineError;
use exif_indexer_shared::ObjectIdentifier;

pub use http_catalog::{parse_identifiers, HttpCatalog, DEFAULT_KEY_TAG};

/// Source of the identifiers to harvest.
#[async_trait]
pub trait CatalogLister: Send + Sync {
    /// List every identifier in the catalog, in catalog order and without duplicates.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<ObjectIdentifier>)` - The identifiers to process
    /// * `Err(PipelineError::CatalogUnavailable)` - If the listing could not be obtained
    ///   after the retry policy was exhausted
    async fn list_identifiers(&self) -> Result<Vec<ObjectIdentifier>, PipelineError>;
}
