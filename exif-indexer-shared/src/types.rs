//! Core data model.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque key naming one object in the catalog (e.g. `"a.jpg"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectIdentifier(String);

impl ObjectIdentifier {
    /// Create a new identifier.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectIdentifier {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ObjectIdentifier {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for ObjectIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Raw bytes retrieved for one identifier.
///
/// Owned by the producer task that fetched it and dropped once extraction
/// is done.
#[derive(Debug, Clone)]
pub struct RawObject {
    /// The identifier the bytes were fetched for.
    pub identifier: ObjectIdentifier,
    /// The object body.
    pub bytes: Vec<u8>,
}

impl RawObject {
    /// Create a new raw object.
    pub fn new(identifier: ObjectIdentifier, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            identifier,
            bytes: bytes.into(),
        }
    }

    /// Size of the body in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Flat tag-name to tag-value mapping extracted from one image.
///
/// Keys are unique and values are always strings. The map is ordered so the
/// serialized form is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord(BTreeMap<String, String>);

impl MetadataRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, replacing any previous value. Returns the old value.
    pub fn insert(&mut self, tag: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(tag.into(), value.into())
    }

    /// Insert a tag only if it is not already present.
    ///
    /// Returns `true` if the value was stored.
    pub fn insert_if_absent(&mut self, tag: impl Into<String>, value: impl Into<String>) -> bool {
        match self.0.entry(tag.into()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Look up a tag value.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }

    /// Number of tags in the record.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record holds no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(tag, value)` pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Consume the record and return the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl<K, V> FromIterator<(K, V)> for MetadataRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Persisted form of a metadata record, keyed by identifier.
///
/// The document body is the metadata map itself; writing the same document
/// twice leaves the index unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExifDocument {
    /// Document key in the index.
    pub identifier: ObjectIdentifier,
    /// Document body.
    pub metadata: MetadataRecord,
}

impl ExifDocument {
    /// Create a new document.
    pub fn new(identifier: ObjectIdentifier, metadata: MetadataRecord) -> Self {
        Self {
            identifier,
            metadata,
        }
    }
}
