//! # EXIF Indexer Repository
//!
//! This crate provides the search index seam used by the EXIF indexer. It
//! includes the error types, the `SearchEngineClient` trait, an OpenSearch
//! implementation and an in-memory implementation for tests and local runs.

pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod types;

pub use errors::SearchError;
pub use interfaces::SearchEngineClient;
pub use memory::MemorySearchClient;
pub use opensearch::{IndexConfig, OpenSearchClient};
pub use types::ClusterHealth;
