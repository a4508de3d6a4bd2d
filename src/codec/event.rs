use std::fmt;

use bitflags::bitflags;
use serde::{Serialize, Serializer};
use serde_with::SerializeDisplay;
use tracing::instrument;

use super::CodecError;

/// Length of one notification-source event frame.
pub const EVENT_FRAME_LEN: usize = 8;

/// What happened to the notification identified by the event UID.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, SerializeDisplay)]
pub enum EventKind {
    Added,
    Modified,
    Removed,
    /// A value this client does not know yet.
    Unknown(u8),
}

impl EventKind {
    /// Returns the raw wire value.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Added => 0,
            Self::Modified => 1,
            Self::Removed => 2,
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<u8> for EventKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Added,
            1 => Self::Modified,
            2 => Self::Removed,
            raw => Self::Unknown(raw),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => f.write_str("added"),
            Self::Modified => f.write_str("modified"),
            Self::Removed => f.write_str("removed"),
            Self::Unknown(raw) => write!(f, "unknown(0x{raw:02X})"),
        }
    }
}

/// Notification category assigned by the peer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, SerializeDisplay)]
pub enum Category {
    Other,
    IncomingCall,
    MissedCall,
    Voicemail,
    Social,
    Schedule,
    Email,
    News,
    HealthFitness,
    BusinessFinance,
    Location,
    Entertainment,
    Unknown(u8),
}

impl Category {
    /// Returns the raw wire value.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Other => 0,
            Self::IncomingCall => 1,
            Self::MissedCall => 2,
            Self::Voicemail => 3,
            Self::Social => 4,
            Self::Schedule => 5,
            Self::Email => 6,
            Self::News => 7,
            Self::HealthFitness => 8,
            Self::BusinessFinance => 9,
            Self::Location => 10,
            Self::Entertainment => 11,
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<u8> for Category {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Other,
            1 => Self::IncomingCall,
            2 => Self::MissedCall,
            3 => Self::Voicemail,
            4 => Self::Social,
            5 => Self::Schedule,
            6 => Self::Email,
            7 => Self::News,
            8 => Self::HealthFitness,
            9 => Self::BusinessFinance,
            10 => Self::Location,
            11 => Self::Entertainment,
            raw => Self::Unknown(raw),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Other => "other",
            Self::IncomingCall => "incoming_call",
            Self::MissedCall => "missed_call",
            Self::Voicemail => "voicemail",
            Self::Social => "social",
            Self::Schedule => "schedule",
            Self::Email => "email",
            Self::News => "news",
            Self::HealthFitness => "health_fitness",
            Self::BusinessFinance => "business_finance",
            Self::Location => "location",
            Self::Entertainment => "entertainment",
            Self::Unknown(raw) => return write!(f, "unknown(0x{raw:02X})"),
        };
        f.write_str(label)
    }
}

bitflags! {
    /// Event flag bits. Unknown bits are retained as delivered.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub struct EventFlags: u8 {
        const SILENT = 1 << 0;
        const IMPORTANT = 1 << 1;
        const PRE_EXISTING = 1 << 2;
        const POSITIVE_ACTION = 1 << 3;
        const NEGATIVE_ACTION = 1 << 4;
    }
}

impl EventFlags {
    /// Returns lowercase labels for the known bits that are set.
    #[must_use]
    pub fn labels(self) -> Vec<&'static str> {
        self.iter_names()
            .map(|(name, _)| match name {
                "SILENT" => "silent",
                "IMPORTANT" => "important",
                "PRE_EXISTING" => "pre_existing",
                "POSITIVE_ACTION" => "positive_action",
                _ => "negative_action",
            })
            .collect()
    }
}

/// One decoded notification-source event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub struct NotificationEvent {
    event_kind: EventKind,
    #[serde(serialize_with = "serialize_flags")]
    flags: EventFlags,
    category: Category,
    category_count: u8,
    notification_uid: u32,
}

impl NotificationEvent {
    /// Creates an event from already-typed fields.
    ///
    /// ```
    /// use ancs::{Category, EventFlags, EventKind, NotificationEvent};
    ///
    /// let event = NotificationEvent::new(
    ///     EventKind::Added,
    ///     EventFlags::IMPORTANT,
    ///     Category::Social,
    ///     1,
    ///     7,
    /// );
    /// assert_eq!(7, event.notification_uid());
    /// ```
    #[must_use]
    pub const fn new(
        event_kind: EventKind,
        flags: EventFlags,
        category: Category,
        category_count: u8,
        notification_uid: u32,
    ) -> Self {
        Self {
            event_kind,
            flags,
            category,
            category_count,
            notification_uid,
        }
    }

    #[must_use]
    pub const fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    #[must_use]
    pub const fn flags(&self) -> EventFlags {
        self.flags
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub const fn category_count(&self) -> u8 {
        self.category_count
    }

    #[must_use]
    pub const fn notification_uid(&self) -> u32 {
        self.notification_uid
    }

    /// Encodes the event back into its 8-byte wire form.
    ///
    /// ```
    /// let frame = [0x00, 0x02, 0x04, 0x01, 0x2A, 0x00, 0x00, 0x00];
    /// let event = ancs::decode_event(&frame)?;
    /// assert_eq!(frame, event.encode());
    /// # Ok::<(), ancs::CodecError>(())
    /// ```
    #[must_use]
    pub fn encode(&self) -> [u8; EVENT_FRAME_LEN] {
        let [uid0, uid1, uid2, uid3] = self.notification_uid.to_le_bytes();
        [
            self.event_kind.as_raw(),
            self.flags.bits(),
            self.category.as_raw(),
            self.category_count,
            uid0,
            uid1,
            uid2,
            uid3,
        ]
    }
}

/// Decodes one notification-source frame.
///
/// Bytes beyond the first eight are ignored.
///
/// # Errors
///
/// Returns [`CodecError::ShortFrame`] when the frame is shorter than eight bytes.
#[instrument(skip(frame), level = "trace", fields(frame_len = frame.len()))]
pub fn decode_event(frame: &[u8]) -> Result<NotificationEvent, CodecError> {
    let Some(header) = frame.first_chunk::<EVENT_FRAME_LEN>() else {
        return Err(CodecError::ShortFrame {
            expected: EVENT_FRAME_LEN,
            actual: frame.len(),
        });
    };
    let [kind, flags, category, category_count, uid @ ..] = *header;

    Ok(NotificationEvent {
        event_kind: EventKind::from(kind),
        flags: EventFlags::from_bits_retain(flags),
        category: Category::from(category),
        category_count,
        notification_uid: u32::from_le_bytes(uid),
    })
}

fn serialize_flags<S>(flags: &EventFlags, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(flags.bits())
}
