use std::fmt;

use serde_with::SerializeDisplay;
use tracing::instrument;

use super::CodecError;

/// Text stored in place of an attribute value that is not valid UTF-8.
pub const UNDECODABLE_SENTINEL: &str = "[undecodable]";

const ATTRIBUTE_HEADER_LEN: usize = 3;

/// Notification attribute identifiers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, SerializeDisplay)]
pub enum AttributeKind {
    AppIdentifier,
    Title,
    Subtitle,
    Message,
    MessageSize,
    Date,
    PositiveActionLabel,
    NegativeActionLabel,
    Unknown(u8),
}

impl AttributeKind {
    /// Returns the raw wire value.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::AppIdentifier => 0,
            Self::Title => 1,
            Self::Subtitle => 2,
            Self::Message => 3,
            Self::MessageSize => 4,
            Self::Date => 5,
            Self::PositiveActionLabel => 6,
            Self::NegativeActionLabel => 7,
            Self::Unknown(raw) => raw,
        }
    }

    /// Returns a human-readable label for terminal output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::AppIdentifier => "App",
            Self::Title => "Title",
            Self::Subtitle => "Subtitle",
            Self::Message => "Message",
            Self::MessageSize => "Message size",
            Self::Date => "Date",
            Self::PositiveActionLabel => "Positive action",
            Self::NegativeActionLabel => "Negative action",
            Self::Unknown(_) => "Unknown attribute",
        }
    }
}

impl From<u8> for AttributeKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::AppIdentifier,
            1 => Self::Title,
            2 => Self::Subtitle,
            3 => Self::Message,
            4 => Self::MessageSize,
            5 => Self::Date,
            6 => Self::PositiveActionLabel,
            7 => Self::NegativeActionLabel,
            raw => Self::Unknown(raw),
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AppIdentifier => "app_identifier",
            Self::Title => "title",
            Self::Subtitle => "subtitle",
            Self::Message => "message",
            Self::MessageSize => "message_size",
            Self::Date => "date",
            Self::PositiveActionLabel => "positive_action_label",
            Self::NegativeActionLabel => "negative_action_label",
            Self::Unknown(raw) => return write!(f, "unknown(0x{raw:02X})"),
        };
        f.write_str(label)
    }
}

/// A decoded `[id:1][len:2]` attribute header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AttributeHeader {
    pub kind: AttributeKind,
    pub length: u16,
    /// Offset of the first value byte.
    pub next_offset: usize,
}

/// Decodes the attribute header starting at `offset`.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] when fewer than three bytes remain.
///
/// ```
/// use ancs::{AttributeKind, decode_attribute_header};
///
/// let header = decode_attribute_header(&[0xAA, 0x01, 0x03, 0x00], 1)?;
/// assert_eq!(AttributeKind::Title, header.kind);
/// assert_eq!(3, header.length);
/// assert_eq!(4, header.next_offset);
/// # Ok::<(), ancs::CodecError>(())
/// ```
pub fn decode_attribute_header(frame: &[u8], offset: usize) -> Result<AttributeHeader, CodecError> {
    let Some([id, low, high]) = frame
        .get(offset..)
        .and_then(|rest| rest.first_chunk::<ATTRIBUTE_HEADER_LEN>())
        .copied()
    else {
        return Err(CodecError::Truncated {
            offset,
            needed: ATTRIBUTE_HEADER_LEN,
            remaining: frame.len().saturating_sub(offset),
        });
    };

    Ok(AttributeHeader {
        kind: AttributeKind::from(id),
        length: u16::from_le_bytes([low, high]),
        next_offset: offset + ATTRIBUTE_HEADER_LEN,
    })
}

/// Decodes `length` bytes at `offset` as UTF-8 text.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] when fewer than `length` bytes remain, or
/// [`CodecError::Undecodable`] when the bytes are not valid UTF-8.
#[instrument(skip(frame), level = "trace", fields(frame_len = frame.len()))]
pub fn decode_attribute_value(
    frame: &[u8],
    offset: usize,
    length: u16,
) -> Result<String, CodecError> {
    let length = usize::from(length);
    let Some(bytes) = offset
        .checked_add(length)
        .and_then(|end| frame.get(offset..end))
    else {
        return Err(CodecError::Truncated {
            offset,
            needed: length,
            remaining: frame.len().saturating_sub(offset),
        });
    };

    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_error| CodecError::Undecodable { offset, length })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[], 0, 0)]
    #[case(&[0x01, 0x03], 0, 2)]
    #[case(&[0x00, 0x00, 0x00, 0x00, 0x01], 3, 2)]
    #[case(&[0x00], 4, 0)]
    fn header_requires_three_bytes(
        #[case] frame: &[u8],
        #[case] offset: usize,
        #[case] expected_remaining: usize,
    ) {
        assert_matches!(
            decode_attribute_header(frame, offset),
            Err(CodecError::Truncated { needed: 3, remaining, .. }) if remaining == expected_remaining
        );
    }

    #[test]
    fn header_reads_little_endian_length() {
        let header =
            decode_attribute_header(&[0x03, 0x34, 0x12], 0).expect("header should decode");
        assert_eq!(
            AttributeHeader {
                kind: AttributeKind::Message,
                length: 0x1234,
                next_offset: 3,
            },
            header
        );
    }

    #[test]
    fn header_preserves_unknown_attribute_ids() {
        let header =
            decode_attribute_header(&[0x42, 0x00, 0x00], 0).expect("header should decode");
        assert_eq!(AttributeKind::Unknown(0x42), header.kind);
    }

    #[test]
    fn value_decodes_utf8_text() {
        let frame = "xx你好".as_bytes();
        let value = decode_attribute_value(frame, 2, 6).expect("utf-8 value should decode");
        assert_eq!("你好", value);
    }

    #[test]
    fn value_of_zero_length_is_empty() {
        let value = decode_attribute_value(&[0x01], 1, 0).expect("empty value should decode");
        assert_eq!("", value);
    }

    #[test]
    fn value_rejects_truncated_payload() {
        assert_matches!(
            decode_attribute_value(b"AB", 0, 3),
            Err(CodecError::Truncated {
                offset: 0,
                needed: 3,
                remaining: 2,
            })
        );
    }

    #[test]
    fn value_reports_invalid_utf8() {
        assert_matches!(
            decode_attribute_value(&[0xC3, 0x28], 0, 2),
            Err(CodecError::Undecodable {
                offset: 0,
                length: 2,
            })
        );
    }
}
