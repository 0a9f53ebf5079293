//! EXIF metadata extraction from raw image bytes.

use std::io::Cursor;

use exif::{Exif, Field, In, Reader, Value};
use tracing::debug;

use exif_indexer_shared::{MetadataRecord, RawObject};

/// Value stored for a tag whose payload the EXIF reader could not decode.
pub const UNDECODABLE_PLACEHOLDER: &str = "<undecodable>";

/// Result of extracting one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// The extracted tags. Possibly empty.
    pub record: MetadataRecord,
    /// Tags whose value was decoded lossily or replaced by a placeholder.
    pub degraded_tags: Vec<String>,
    /// Errors reported by the reader for entries it had to skip.
    pub parse_errors: Vec<String>,
}

impl Extraction {
    /// Whether any information was lost while extracting.
    pub fn is_degraded(&self) -> bool {
        !self.degraded_tags.is_empty() || !self.parse_errors.is_empty()
    }
}

/// Extracts EXIF tags from images.
///
/// Never fails: unreadable entries are skipped or replaced, and an image
/// without EXIF data yields an empty record.
pub struct ExifExtractor;

impl ExifExtractor {
    /// Extract every readable tag from `raw`.
    pub fn extract(raw: &RawObject) -> Extraction {
        let mut reader = Reader::new();
        reader.continue_on_error(true);

        let mut extraction = Extraction::default();

        let exif = match reader.read_from_container(&mut Cursor::new(&raw.bytes)) {
            Ok(exif) => exif,
            Err(exif::Error::PartialResult(partial)) => {
                let (exif, errors) = partial.into_inner();
                extraction.parse_errors = errors.iter().map(ToString::to_string).collect();
                exif
            }
            Err(exif::Error::NotFound(_)) => {
                debug!(identifier = %raw.identifier, "Object has no EXIF data");
                return extraction;
            }
            Err(e) => {
                debug!(identifier = %raw.identifier, error = %e, "Could not read EXIF container");
                extraction.parse_errors.push(e.to_string());
                return extraction;
            }
        };

        for field in exif.fields() {
            let name = Self::tag_name(field);
            let (value, lossless) = Self::normalize(&exif, field);

            if extraction.record.insert_if_absent(name.clone(), value) && !lossless {
                extraction.degraded_tags.push(name);
            }
        }

        extraction
    }

    /// Primary image tags keep their bare name; other IFDs are prefixed.
    fn tag_name(field: &Field) -> String {
        if field.ifd_num == In::PRIMARY {
            field.tag.to_string()
        } else if field.ifd_num == In::THUMBNAIL {
            format!("Thumbnail {}", field.tag)
        } else {
            format!("Ifd{} {}", field.ifd_num.index(), field.tag)
        }
    }

    /// Render a field value as a string.
    ///
    /// Returns the string and whether it was decoded without loss.
    fn normalize(exif: &Exif, field: &Field) -> (String, bool) {
        match &field.value {
            Value::Ascii(strings) => {
                let mut lossless = true;
                let parts: Vec<String> = strings
                    .iter()
                    .map(|bytes| {
                        let text = match std::str::from_utf8(bytes) {
                            Ok(text) => text.to_string(),
                            Err(_) => {
                                lossless = false;
                                String::from_utf8_lossy(bytes).into_owned()
                            }
                        };
                        text.trim_end_matches('\0').trim().to_string()
                    })
                    .collect();
                (parts.join(", "), lossless)
            }
            Value::Unknown(..) => (UNDECODABLE_PLACEHOLDER.to_string(), false),
            _ => (field.display_value().with_unit(exif).to_string(), true),
        }
    }
}
