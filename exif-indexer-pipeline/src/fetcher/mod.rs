//! Fetcher module for the EXIF indexer pipeline.
//!
//! Retrieves the raw bytes of one catalog object.

mod http_fetcher;

use async_trait::async_trait;

use crate::errors::PipelineError;
use exif_indexer_shared::{ObjectIdentifier, RawObject};

pub use http_fetcher::HttpFetcher;

/// Retrieves raw object bytes by identifier.
///
/// Implementations do not retry; a failure is reported once and the
/// identifier is dropped for the run.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// Fetch the object named by `identifier`.
    ///
    /// # Returns
    ///
    /// * `Ok(RawObject)` - The object body
    /// * `Err(PipelineError::FetchFailed)` - On transport error or non-success status
    async fn fetch(&self, identifier: &ObjectIdentifier) -> Result<RawObject, PipelineError>;
}
