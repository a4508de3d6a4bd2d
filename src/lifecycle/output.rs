use serde::Serialize;
use serde_with::SerializeDisplay;
use thiserror::Error;

use super::session::SessionState;
use crate::assembler::AttributeRecord;
use crate::codec::NotificationEvent;
use crate::hw::PeerId;
use crate::protocol::EndpointId;

/// Everything the client publishes to its presentation layer.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientOutput {
    State(StateChange),
    Event(NotificationEvent),
    Record(AttributeRecord),
    Status(StatusUpdate),
}

/// A lifecycle transition, with the session peer when one exists.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct StateChange {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<PeerId>,
}

/// Why a session ended without the peer disconnecting cleanly.
#[derive(Debug, Clone, Eq, PartialEq, Error, SerializeDisplay)]
pub enum SessionFailure {
    #[error("connection failed: {reason}")]
    ConnectFailed { reason: String },
    #[error("service discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
    #[error("{missing}")]
    ServiceMissing { missing: String },
    #[error("enabling notifications failed: {reason}")]
    SubscribeFailed { reason: String },
    #[error("service discovery timed out")]
    Timeout,
    #[error("link lost")]
    LinkLost,
}

/// Non-fatal conditions surfaced while the client runs.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusUpdate {
    CandidateAccepted {
        peer: PeerId,
        name: Option<String>,
        rssi: Option<i16>,
    },
    ScanFinished,
    ScanFailed {
        reason: String,
    },
    SessionFailed {
        peer: PeerId,
        failure: SessionFailure,
    },
    MtuChanged {
        mtu: u16,
    },
    DataSourceEnabled,
    AttributesRequested {
        notification_uid: u32,
    },
    EventIgnored {
        frame_len: usize,
    },
    FrameRejected {
        endpoint: EndpointId,
        reason: String,
    },
    WriteFailed {
        endpoint: EndpointId,
        reason: String,
    },
}
