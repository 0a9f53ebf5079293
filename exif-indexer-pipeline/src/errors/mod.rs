//! Error types for the EXIF indexer pipeline.

use exif_indexer_repository::SearchError;
use exif_indexer_shared::ObjectIdentifier;
use thiserror::Error;

/// Errors that can occur in the EXIF indexer pipeline.
///
/// Only [`PipelineError::CatalogUnavailable`] aborts a run. Everything else is
/// scoped to one identifier or one message and is logged and absorbed.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The catalog listing could not be obtained after retries.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Retrieving the raw object failed.
    #[error("Fetch failed for {identifier}: {cause}")]
    FetchFailed {
        identifier: ObjectIdentifier,
        cause: String,
    },

    /// Publishing the message to the dispatch queue failed.
    #[error("Publish failed for {identifier}: {cause}")]
    PublishFailed {
        identifier: ObjectIdentifier,
        cause: String,
    },

    /// Writing the document to the search index failed.
    #[error("Index write failed for {identifier}: {source}")]
    IndexWriteFailed {
        identifier: ObjectIdentifier,
        #[source]
        source: SearchError,
    },

    /// The queue broker or index cluster could not be reached.
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The operation was interrupted by shutdown.
    #[error("Pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Create a catalog unavailable error.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::CatalogUnavailable(msg.into())
    }

    /// Create a fetch error for one identifier.
    pub fn fetch(identifier: &ObjectIdentifier, cause: impl Into<String>) -> Self {
        Self::FetchFailed {
            identifier: identifier.clone(),
            cause: cause.into(),
        }
    }

    /// Create a publish error for one identifier.
    pub fn publish(identifier: &ObjectIdentifier, cause: impl Into<String>) -> Self {
        Self::PublishFailed {
            identifier: identifier.clone(),
            cause: cause.into(),
        }
    }

    /// Create an index write error for one identifier.
    pub fn index_write(identifier: &ObjectIdentifier, source: SearchError) -> Self {
        Self::IndexWriteFailed {
            identifier: identifier.clone(),
            source,
        }
    }

    /// Create a broker unavailable error.
    pub fn broker(msg: impl Into<String>) -> Self {
        Self::BrokerUnavailable(msg.into())
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::CatalogUnavailable(_))
    }
}

impl From<rdkafka::error::KafkaError> for PipelineError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}
