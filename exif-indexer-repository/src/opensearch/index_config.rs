//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the EXIF index.

use serde_json::{json, Value};

/// Default name of the search index.
pub const DEFAULT_INDEX_NAME: &str = "exif";

/// Configuration for the EXIF index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Name of the index documents are written to.
    pub name: String,
}

impl IndexConfig {
    /// Create a config for the given index name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_NAME)
    }
}

/// Get the index settings and mappings for the EXIF index.
///
/// Tag names are not known up front, so every string field is mapped through a
/// dynamic template: a `keyword` for exact filtering (e.g. `Make`) with a `text`
/// subfield for full-text matching on free-form tags such as `ImageDescription`.
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "dynamic_templates": [
                {
                    "exif_tags": {
                        "match_mapping_type": "string",
                        "mapping": {
                            "type": "keyword",
                            "ignore_above": 1024,
                            "fields": {
                                "text": {
                                    "type": "text"
                                }
                            }
                        }
                    }
                }
            ]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_settings_structure() {
        let settings = get_index_settings();

        assert!(settings["settings"]["number_of_shards"].is_number());
        assert!(settings["settings"]["number_of_replicas"].is_number());

        let template = &settings["mappings"]["dynamic_templates"][0]["exif_tags"];
        assert_eq!(template["match_mapping_type"], "string");
        assert_eq!(template["mapping"]["type"], "keyword");
        assert_eq!(template["mapping"]["fields"]["text"]["type"], "text");
    }

    #[test]
    fn test_default_index_name() {
        assert_eq!(IndexConfig::default().name, "exif");
    }
}
