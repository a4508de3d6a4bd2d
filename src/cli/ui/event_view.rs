use std::fmt::{self, Display, Formatter};

use crate::codec::{EventFlags, NotificationEvent};

use super::painter::Painter;
use super::table::Table;

fn flag_labels(flags: EventFlags) -> String {
    let labels = flags.labels();
    if labels.is_empty() {
        "none".to_string()
    } else {
        labels.join(", ")
    }
}

/// Renders a decoded event as a key-value table.
pub(crate) struct EventView<'a> {
    event: &'a NotificationEvent,
    painter: &'a Painter,
}

impl<'a> EventView<'a> {
    pub(crate) fn new(event: &'a NotificationEvent, painter: &'a Painter) -> Self {
        Self { event, painter }
    }
}

impl Display for EventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let event = self.event;
        let table = Table::key_value(
            self.painter,
            vec![
                ("event", self.painter.value(event.event_kind().to_string())),
                ("category", self.painter.value(event.category().to_string())),
                (
                    "category_count",
                    self.painter.value(event.category_count().to_string()),
                ),
                ("flags", self.painter.value(flag_labels(event.flags()))),
                (
                    "notification_uid",
                    self.painter.value(event.notification_uid().to_string()),
                ),
            ],
        );
        write!(f, "{}", self.painter.heading("Notification event:"))?;
        write!(f, "\n{table}")
    }
}

/// Renders a live event as a single line.
pub(crate) struct EventLine<'a> {
    event: &'a NotificationEvent,
    painter: &'a Painter,
}

impl<'a> EventLine<'a> {
    pub(crate) fn new(event: &'a NotificationEvent, painter: &'a Painter) -> Self {
        Self { event, painter }
    }
}

impl Display for EventLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let event = self.event;
        write!(
            f,
            "{} {} {} {}",
            self.painter.muted(format!("[uid {}]", event.notification_uid())),
            self.painter.value(event.event_kind().to_string()),
            self.painter.heading(event.category().to_string()),
            self.painter.muted(format!(
                "count={} flags={}",
                event.category_count(),
                flag_labels(event.flags())
            )),
        )
    }
}
