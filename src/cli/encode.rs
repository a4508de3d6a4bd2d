use std::io;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tracing::instrument;

use crate::cli::{OutputFormat, write_json_line};
use crate::command::{ActionId, CommandBuilder, CommandId};
use crate::utils::format_hex;

use super::ui::{CommandView, Painter};

/// Control-point commands that can be encoded offline.
#[derive(Debug, Clone, Subcommand)]
pub enum EncodeCommand {
    /// Get Notification Attributes for app identifier, title and message.
    GetAttributes {
        /// Notification UID from a notification-source event.
        uid: u32,
    },
    /// Perform Notification Action.
    Action {
        /// Notification UID from a notification-source event.
        uid: u32,
        #[arg(value_enum)]
        action: ActionId,
    },
}

impl EncodeCommand {
    fn encode(&self) -> (CommandId, Vec<u8>) {
        match *self {
            Self::GetAttributes { uid } => (
                CommandId::GetNotificationAttributes,
                CommandBuilder::build_get_attributes_command(uid).to_vec(),
            ),
            Self::Action { uid, action } => (
                CommandId::PerformNotificationAction,
                CommandBuilder::build_perform_action_command(uid, action.as_raw()).to_vec(),
            ),
        }
    }
}

#[derive(Serialize)]
struct EncodedCommand {
    command: String,
    length: usize,
    hex: String,
}

/// Executes `encode`.
#[instrument(skip(out, painter), level = "debug")]
pub(crate) fn run<W>(
    command: &EncodeCommand,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let (command_id, bytes) = command.encode();
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", CommandView::new(command_id, &bytes, painter))?,
        OutputFormat::Json => write_json_line(
            out,
            &EncodedCommand {
                command: command_id.to_string(),
                length: bytes.len(),
                hex: hex::encode(&bytes),
            },
        )?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn action_encoding_carries_low_uid_bytes() {
        let (command_id, bytes) = EncodeCommand::Action {
            uid: 0x0102_0304,
            action: ActionId::Positive,
        }
        .encode();

        assert_eq!(CommandId::PerformNotificationAction, command_id);
        assert_eq!("02 04 03 02 00", format_hex(&bytes));
    }

    #[test]
    fn get_attributes_json_includes_hex() -> Result<()> {
        let mut out = Vec::new();
        run(
            &EncodeCommand::GetAttributes { uid: 300 },
            &mut out,
            OutputFormat::Json,
            &Painter::new(false),
        )?;

        assert_snapshot!(
            String::from_utf8(out)?.trim_end(),
            @r#"{"command":"get_notification_attributes","length":14,"hex":"002c01000000ffff01ffff03ffff"}"#
        );
        Ok(())
    }
}
