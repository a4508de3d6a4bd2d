use std::fmt::{self, Display, Formatter};

use crate::lifecycle::{SessionState, StateChange, StatusUpdate};
use crate::utils::format_rssi;

use super::painter::Painter;

/// Renders a lifecycle transition.
pub(crate) struct StateLine<'a> {
    change: &'a StateChange,
    painter: &'a Painter,
}

impl<'a> StateLine<'a> {
    pub(crate) fn new(change: &'a StateChange, painter: &'a Painter) -> Self {
        Self { change, painter }
    }
}

impl Display for StateLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.change.state.to_string();
        let state = match self.change.state {
            SessionState::Active => self.painter.success(state),
            SessionState::TimedOut | SessionState::Disconnected => self.painter.warning(state),
            _ => self.painter.value(state),
        };
        write!(f, "{} {state}", self.painter.muted("state"))?;
        if let Some(peer) = &self.change.peer {
            write!(f, " {}", self.painter.muted(format!("({peer})")))?;
        }
        Ok(())
    }
}

/// Renders a status update.
pub(crate) struct StatusLine<'a> {
    status: &'a StatusUpdate,
    painter: &'a Painter,
}

impl<'a> StatusLine<'a> {
    pub(crate) fn new(status: &'a StatusUpdate, painter: &'a Painter) -> Self {
        Self { status, painter }
    }
}

impl Display for StatusLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        let label = painter.muted("status");
        match self.status {
            StatusUpdate::CandidateAccepted { peer, name, rssi } => write!(
                f,
                "{label} {} {peer} {}",
                painter.success("candidate"),
                painter.muted(format!(
                    "name={} rssi={}",
                    name.as_deref().unwrap_or("<unknown>"),
                    format_rssi(*rssi)
                ))
            ),
            StatusUpdate::ScanFinished => {
                write!(f, "{label} {}", painter.warning("scan finished without a candidate"))
            }
            StatusUpdate::ScanFailed { reason } => {
                write!(f, "{label} {} {reason}", painter.failure("scan failed:"))
            }
            StatusUpdate::SessionFailed { peer, failure } => write!(
                f,
                "{label} {} {failure}",
                painter.failure(format!("session with {peer} ended:"))
            ),
            StatusUpdate::MtuChanged { mtu } => {
                write!(f, "{label} mtu {}", painter.value(mtu.to_string()))
            }
            StatusUpdate::DataSourceEnabled => write!(f, "{label} data source enabled"),
            StatusUpdate::AttributesRequested { notification_uid } => write!(
                f,
                "{label} requested attributes for uid {}",
                painter.value(notification_uid.to_string())
            ),
            StatusUpdate::EventIgnored { frame_len } => write!(
                f,
                "{label} {}",
                painter.muted(format!("ignored {frame_len}-byte event frame"))
            ),
            StatusUpdate::FrameRejected { endpoint, reason } => write!(
                f,
                "{label} {} {reason}",
                painter.warning(format!("rejected {endpoint} frame:"))
            ),
            StatusUpdate::WriteFailed { endpoint, reason } => write!(
                f,
                "{label} {} {reason}",
                painter.warning(format!("write to {endpoint} failed:"))
            ),
        }
    }
}
