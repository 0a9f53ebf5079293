//! Extractor module for the EXIF indexer pipeline.
//!
//! Turns raw image bytes into a flat metadata record.

mod exif_extractor;

pub use exif_extractor::{ExifExtractor, Extraction, UNDECODABLE_PLACEHOLDER};
