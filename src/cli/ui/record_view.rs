use std::fmt::{self, Display, Formatter};

use crate::assembler::AttributeRecord;

use super::painter::Painter;
use super::table::Table;

/// Renders an attribute record under a notification heading.
pub(crate) struct RecordView<'a> {
    record: &'a AttributeRecord,
    painter: &'a Painter,
}

impl<'a> RecordView<'a> {
    pub(crate) fn new(record: &'a AttributeRecord, painter: &'a Painter) -> Self {
        Self { record, painter }
    }
}

impl Display for RecordView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.painter
                .heading(format!("Notification {}:", self.record.notification_uid()))
        )?;
        if self.record.is_empty() {
            return write!(f, " {}", self.painter.muted("<no attributes>"));
        }

        let rows = self
            .record
            .attributes()
            .iter()
            .map(|attribute| {
                (
                    attribute.kind.display_name(),
                    self.painter.value(&attribute.value),
                )
            })
            .collect();
        write!(f, "\n{}", Table::key_value(self.painter, rows))
    }
}
