use std::fmt::{self, Display, Formatter};

use crate::command::CommandId;
use crate::utils::format_hex;

use super::painter::Painter;
use super::table::Table;

/// Renders an encoded control-point command.
pub(crate) struct CommandView<'a> {
    command: CommandId,
    bytes: &'a [u8],
    painter: &'a Painter,
}

impl<'a> CommandView<'a> {
    pub(crate) fn new(command: CommandId, bytes: &'a [u8], painter: &'a Painter) -> Self {
        Self {
            command,
            bytes,
            painter,
        }
    }
}

impl Display for CommandView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let table = Table::key_value(
            self.painter,
            vec![
                ("command", self.painter.value(self.command.to_string())),
                ("length", self.painter.value(self.bytes.len().to_string())),
                ("bytes", self.painter.value(format_hex(self.bytes))),
            ],
        );
        write!(f, "{}", self.painter.heading("Control point command:"))?;
        write!(f, "\n{table}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuilder;

    #[test]
    fn command_view_shows_hex_bytes() {
        let bytes = CommandBuilder::build_perform_action_command(1, 0x01);
        let painter = Painter::new(false);
        let rendered = CommandView::new(CommandId::PerformNotificationAction, &bytes, &painter)
            .to_string();

        assert!(rendered.contains("perform_notification_action"));
        assert!(rendered.contains("02 01 00 00 01"));
        assert!(rendered.contains("5"));
    }
}
