//! # EXIF Indexer Shared
//!
//! Types shared by every stage of the EXIF indexer: the identifiers handed out
//! by the catalog, the metadata records produced by extraction, the wire
//! envelope carried by the dispatch queue and the document written to the
//! search index.

pub mod errors;
pub mod message;
pub mod types;

pub use errors::MessageError;
pub use message::DispatchMessage;
pub use types::{ExifDocument, MetadataRecord, ObjectIdentifier, RawObject};
