//! # EXIF Indexer Pipeline
//!
//! This crate provides the pipeline that harvests images from a catalog,
//! extracts their EXIF metadata and loads it into the search index.
//!
//! ## Architecture
//!
//! Extraction and indexing are decoupled by a durable dispatch queue:
//!
//! 1. **Catalog**: Lists the object identifiers to process
//! 2. **Producers**: A bounded worker pool that fetches each object, extracts
//!    its metadata and publishes one message per identifier
//! 3. **Queue**: Kafka topic (or an in-memory stand-in) with manual acknowledgment
//! 4. **Sink**: Waits for the cluster to be ready, then writes one document per
//!    message, acknowledging only after the write succeeded
//! 5. **Orchestrator**: Coordinates the run and the shutdown path

pub mod catalog;
pub mod errors;
pub mod extractor;
pub mod fetcher;
pub mod orchestrator;
pub mod producer;
pub mod queue;
pub mod retry;
pub mod sink;

pub use errors::PipelineError;
