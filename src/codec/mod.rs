//! Binary codecs for the two inbound ANCS wire formats.
//!
//! Event frames arrive on the notification source and are fixed at eight
//! bytes. Attribute responses arrive on the data source and carry a run of
//! `[id:1][len:2][value:len]` records. All multi-byte integers are
//! little-endian.

mod attribute;
mod event;

use thiserror::Error;

pub use self::attribute::{
    AttributeHeader, AttributeKind, UNDECODABLE_SENTINEL, decode_attribute_header,
    decode_attribute_value,
};
pub use self::event::{
    Category, EVENT_FRAME_LEN, EventFlags, EventKind, NotificationEvent, decode_event,
};

/// Errors returned while decoding ANCS frames.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CodecError {
    /// The frame is shorter than the fixed header it must carry.
    #[error("frame is too short: expected at least {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },
    /// Fewer bytes remain than the next field declares.
    #[error("frame truncated at offset {offset}: needed {needed} bytes but {remaining} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    /// An attribute value is not valid UTF-8.
    #[error("attribute value at offset {offset} ({length} bytes) is not valid UTF-8")]
    Undecodable { offset: usize, length: usize },
}
