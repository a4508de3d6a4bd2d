use serde::Serialize;
use tracing::{instrument, warn};

use crate::codec::{
    AttributeKind, CodecError, UNDECODABLE_SENTINEL, decode_attribute_header,
    decode_attribute_value,
};

/// Command id plus UID.
const RESPONSE_HEADER_LEN: usize = 5;

/// Text returned by the convenience accessors when an attribute is absent.
pub const MISSING_ATTRIBUTE: &str = "N/A";

/// One decoded attribute value.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub value: String,
}

/// Attributes returned for one notification UID.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AttributeRecord {
    command_id: u8,
    notification_uid: u32,
    attributes: Vec<Attribute>,
}

impl AttributeRecord {
    fn new(command_id: u8, notification_uid: u32) -> Self {
        Self {
            command_id,
            notification_uid,
            attributes: Vec::new(),
        }
    }

    /// Stores a value; a repeated kind keeps its first position and takes the new value.
    fn insert(&mut self, kind: AttributeKind, value: String) {
        match self
            .attributes
            .iter_mut()
            .find(|attribute| attribute.kind == kind)
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { kind, value }),
        }
    }

    #[must_use]
    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    #[must_use]
    pub fn notification_uid(&self) -> u32 {
        self.notification_uid
    }

    /// Attributes in arrival order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Returns the value for `kind`, if it arrived intact.
    #[must_use]
    pub fn get(&self, kind: AttributeKind) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.kind == kind)
            .map(|attribute| attribute.value.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    #[must_use]
    pub fn app_identifier(&self) -> &str {
        self.get(AttributeKind::AppIdentifier)
            .unwrap_or(MISSING_ATTRIBUTE)
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.get(AttributeKind::Title).unwrap_or(MISSING_ATTRIBUTE)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.get(AttributeKind::Message).unwrap_or(MISSING_ATTRIBUTE)
    }
}

/// Parses one data-source response into an attribute record.
///
/// Parsing stops at the first incomplete header or value and returns what was
/// assembled up to that point. Values that are not UTF-8 are replaced by
/// [`UNDECODABLE_SENTINEL`].
///
/// ```
/// use ancs::{AttributeKind, parse_response};
///
/// let record = parse_response(&[0x00, 0x01, 0, 0, 0, 0x01, 0x03, 0x00, b'A', b'B', b'C'])?;
/// assert_eq!(Some("ABC"), record.get(AttributeKind::Title));
/// # Ok::<(), ancs::CodecError>(())
/// ```
///
/// # Errors
///
/// Returns [`CodecError::ShortFrame`] when the frame cannot hold a command id and UID.
#[instrument(skip(frame), level = "debug", fields(frame_len = frame.len()))]
pub fn parse_response(frame: &[u8]) -> Result<AttributeRecord, CodecError> {
    let Some(&[command_id, uid0, uid1, uid2, uid3]) = frame.first_chunk::<RESPONSE_HEADER_LEN>()
    else {
        return Err(CodecError::ShortFrame {
            expected: RESPONSE_HEADER_LEN,
            actual: frame.len(),
        });
    };

    let mut record = AttributeRecord::new(command_id, u32::from_le_bytes([uid0, uid1, uid2, uid3]));
    let mut offset = RESPONSE_HEADER_LEN;
    while offset < frame.len() {
        let header = match decode_attribute_header(frame, offset) {
            Ok(header) => header,
            Err(error) => {
                warn!(%error, uid = record.notification_uid, "attribute header incomplete");
                break;
            }
        };

        let value = match decode_attribute_value(frame, header.next_offset, header.length) {
            Ok(value) => value,
            Err(error @ CodecError::Undecodable { .. }) => {
                warn!(%error, kind = %header.kind, "substituting undecodable attribute value");
                UNDECODABLE_SENTINEL.to_string()
            }
            Err(error) => {
                warn!(%error, kind = %header.kind, "attribute value incomplete");
                break;
            }
        };

        record.insert(header.kind, value);
        offset = header.next_offset + usize::from(header.length);
    }

    Ok(record)
}
