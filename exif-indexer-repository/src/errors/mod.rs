//! Error types for the EXIF indexer repository.

mod search_error;

pub use search_error::SearchError;
