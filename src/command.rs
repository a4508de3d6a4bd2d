use strum_macros::Display;

use crate::codec::AttributeKind;

/// Length of a Get Notification Attributes command.
pub const GET_ATTRIBUTES_COMMAND_LEN: usize = 14;

/// Length of a Perform Notification Action command.
///
/// Only the low three UID bytes fit between the opcode and the action id.
pub const PERFORM_ACTION_COMMAND_LEN: usize = 5;

/// Attribute length requesting the full value without truncation.
const NO_TRUNCATION: u16 = 0xFFFF;

/// Attributes requested for every notification, in request order.
///
/// The peer answers in this order; the assembler does not depend on it.
pub const REQUESTED_ATTRIBUTES: [AttributeKind; 3] = [
    AttributeKind::AppIdentifier,
    AttributeKind::Title,
    AttributeKind::Message,
];

/// Control-point command identifiers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum CommandId {
    #[strum(to_string = "get_notification_attributes")]
    GetNotificationAttributes,
    #[strum(to_string = "perform_notification_action")]
    PerformNotificationAction,
}

impl CommandId {
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::GetNotificationAttributes => 0x00,
            Self::PerformNotificationAction => 0x02,
        }
    }
}

/// Action identifiers accepted by Perform Notification Action.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, clap::ValueEnum)]
#[strum(serialize_all = "snake_case")]
pub enum ActionId {
    Positive,
    Negative,
}

impl ActionId {
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Positive => 0x00,
            Self::Negative => 0x01,
        }
    }
}

/// Builds outbound control-point commands.
pub struct CommandBuilder;

impl CommandBuilder {
    /// Builds a Get Notification Attributes request for app id, title and message.
    ///
    /// ```
    /// let command = ancs::CommandBuilder::build_get_attributes_command(300);
    /// assert_eq!([0x2C, 0x01, 0x00, 0x00], command[1..5]);
    /// ```
    #[must_use]
    pub fn build_get_attributes_command(uid: u32) -> [u8; GET_ATTRIBUTES_COMMAND_LEN] {
        let mut command = [0u8; GET_ATTRIBUTES_COMMAND_LEN];
        command[0] = CommandId::GetNotificationAttributes.as_raw();
        command[1..5].copy_from_slice(&uid.to_le_bytes());

        let [max_low, max_high] = NO_TRUNCATION.to_le_bytes();
        for (slot, attribute) in command[5..].chunks_exact_mut(3).zip(REQUESTED_ATTRIBUTES) {
            slot.copy_from_slice(&[attribute.as_raw(), max_low, max_high]);
        }
        command
    }

    /// Builds a Perform Notification Action command: opcode, the UID's low
    /// three bytes little-endian, then the action id.
    ///
    /// ```
    /// use ancs::{ActionId, CommandBuilder};
    ///
    /// let command = CommandBuilder::build_perform_action_command(1, ActionId::Negative.as_raw());
    /// assert_eq!([0x02, 0x01, 0x00, 0x00, 0x01], command);
    /// ```
    #[must_use]
    pub fn build_perform_action_command(
        uid: u32,
        action_id: u8,
    ) -> [u8; PERFORM_ACTION_COMMAND_LEN] {
        let [uid0, uid1, uid2, _] = uid.to_le_bytes();
        [
            CommandId::PerformNotificationAction.as_raw(),
            uid0,
            uid1,
            uid2,
            action_id,
        ]
    }
}
