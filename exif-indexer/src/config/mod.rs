//! Configuration for the EXIF indexer.

mod dependencies;
mod settings;

pub use dependencies::Dependencies;
pub use settings::Settings;
