//! Dispatch queue wire envelope.
//!
//! A message is a JSON object with a single member, the identifier, whose
//! value is the flat metadata map: `{"a.jpg": {"Make": "Acme"}}`.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::MessageError;
use crate::types::{ExifDocument, MetadataRecord, ObjectIdentifier};

/// One processed identifier travelling from a producer to the index sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchMessage {
    /// The identifier the metadata belongs to.
    pub identifier: ObjectIdentifier,
    /// The extracted metadata.
    pub metadata: MetadataRecord,
}

impl DispatchMessage {
    /// Create a new message.
    pub fn new(identifier: ObjectIdentifier, metadata: MetadataRecord) -> Self {
        Self {
            identifier,
            metadata,
        }
    }

    /// Encode the message for queue transport.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::encode(e.to_string()))
    }

    /// Decode a message received from the queue.
    pub fn from_json(payload: &[u8]) -> Result<Self, MessageError> {
        let envelope: BTreeMap<ObjectIdentifier, MetadataRecord> =
            serde_json::from_slice(payload).map_err(|e| MessageError::decode(e.to_string()))?;

        if envelope.len() != 1 {
            return Err(MessageError::InvalidEnvelope(envelope.len()));
        }

        let (identifier, metadata) = envelope
            .into_iter()
            .next()
            .ok_or(MessageError::InvalidEnvelope(0))?;

        Ok(Self {
            identifier,
            metadata,
        })
    }
}

impl Serialize for DispatchMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.identifier, &self.metadata)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DispatchMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = BTreeMap::<ObjectIdentifier, MetadataRecord>::deserialize(deserializer)?;
        if envelope.len() != 1 {
            return Err(D::Error::custom(format!(
                "expected exactly one identifier, found {}",
                envelope.len()
            )));
        }
        let (identifier, metadata) = envelope
            .into_iter()
            .next()
            .ok_or_else(|| D::Error::custom("empty envelope"))?;
        Ok(Self {
            identifier,
            metadata,
        })
    }
}

impl From<DispatchMessage> for ExifDocument {
    fn from(msg: DispatchMessage) -> Self {
        ExifDocument::new(msg.identifier, msg.metadata)
    }
}
