use std::fmt::{self, Display, Formatter};

use crate::cli::listen::{ListenStopReason, ListenSummary};
use crate::lifecycle::ClientOutput;

use super::event_view::EventLine;
use super::lifecycle_view::{StateLine, StatusLine};
use super::painter::Painter;
use super::record_view::RecordView;

/// Renders one client output in listen mode.
pub(crate) struct ListenOutputView<'a> {
    output: &'a ClientOutput,
    painter: &'a Painter,
}

impl<'a> ListenOutputView<'a> {
    pub(crate) fn new(output: &'a ClientOutput, painter: &'a Painter) -> Self {
        Self { output, painter }
    }
}

impl Display for ListenOutputView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.output {
            ClientOutput::State(change) => write!(f, "{}", StateLine::new(change, self.painter)),
            ClientOutput::Event(event) => write!(f, "{}", EventLine::new(event, self.painter)),
            ClientOutput::Record(record) => write!(f, "{}", RecordView::new(record, self.painter)),
            ClientOutput::Status(status) => write!(f, "{}", StatusLine::new(status, self.painter)),
        }
    }
}

/// Renders the listen summary line.
pub(crate) struct ListenSummaryView<'a> {
    summary: &'a ListenSummary,
    painter: &'a Painter,
}

impl<'a> ListenSummaryView<'a> {
    pub(crate) fn new(summary: &'a ListenSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for ListenSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reason = self.summary.stop_reason().to_string();
        let reason = match self.summary.stop_reason() {
            ListenStopReason::ReachedLimit(_) => self.painter.success(reason),
            ListenStopReason::Interrupted => self.painter.warning(reason),
            ListenStopReason::ScanFinished
            | ListenStopReason::SessionEnded(_)
            | ListenStopReason::ClientStopped => self.painter.failure(reason),
        };
        write!(
            f,
            "{} {reason} {}",
            self.painter.heading("Stopped:"),
            self.painter.value(format!(
                "- received {} event(s) and {} record(s), final state {}",
                self.summary.events(),
                self.summary.records(),
                self.summary.final_state()
            ))
        )
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::lifecycle::{SessionFailure, SessionState};

    #[test]
    fn summary_reports_counts_and_reason() {
        let summary = ListenSummary::new(ListenStopReason::ReachedLimit(2), 2, 1, SessionState::Active);
        let painter = Painter::new(false);
        assert_snapshot!(
            ListenSummaryView::new(&summary, &painter).to_string(),
            @"Stopped: reached limit of 2 event(s) - received 2 event(s) and 1 record(s), final state active"
        );
    }

    #[test]
    fn summary_reports_session_failure() {
        let summary = ListenSummary::new(
            ListenStopReason::SessionEnded(SessionFailure::LinkLost),
            0,
            0,
            SessionState::Idle,
        );
        let painter = Painter::new(false);
        assert_snapshot!(
            ListenSummaryView::new(&summary, &painter).to_string(),
            @"Stopped: session ended: link lost - received 0 event(s) and 0 record(s), final state idle"
        );
    }
}
