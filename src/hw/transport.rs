use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use super::model::{DiscoveredPeer, PeerId, ServiceInfo};
use crate::error::TransportError;
use crate::lifecycle::{Input, QueuedInput};
use crate::protocol::EndpointId;

/// Result reported by an asynchronous GATT operation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GattStatus {
    Success,
    Failure(String),
}

impl<E: std::fmt::Display> From<Result<(), E>> for GattStatus {
    fn from(value: Result<(), E>) -> Self {
        match value {
            Ok(()) => Self::Success,
            Err(error) => Self::Failure(error.to_string()),
        }
    }
}

/// Link-level connection change for one peer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConnectionChange {
    Connected,
    ConnectFailed { reason: String },
    Disconnected,
}

/// Callbacks delivered by a transport, in the order they occurred.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransportEvent {
    ScanResult(DiscoveredPeer),
    ScanFailed {
        reason: String,
    },
    ConnectionState {
        peer: PeerId,
        change: ConnectionChange,
    },
    ServicesDiscovered {
        peer: PeerId,
        outcome: Result<Vec<ServiceInfo>, String>,
    },
    SubscriptionWritten {
        peer: PeerId,
        endpoint: EndpointId,
        status: GattStatus,
    },
    CharacteristicWritten {
        peer: PeerId,
        endpoint: EndpointId,
        status: GattStatus,
    },
    CharacteristicChanged {
        peer: PeerId,
        endpoint: EndpointId,
        value: Vec<u8>,
    },
    MtuChanged {
        peer: PeerId,
        mtu: u16,
        status: GattStatus,
    },
}

/// Posts transport callbacks onto the client's serial event queue.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    inputs: UnboundedSender<QueuedInput>,
}

impl TransportEventSink {
    pub(crate) fn new(inputs: UnboundedSender<QueuedInput>) -> Self {
        Self { inputs }
    }

    /// Queues one callback stamped with the current instant. Events posted
    /// after the client stopped are dropped.
    pub fn post(&self, event: TransportEvent) {
        if self
            .inputs
            .send(QueuedInput::now(Input::Transport(event)))
            .is_err()
        {
            trace!("client stopped; dropping transport event");
        }
    }
}

/// BLE central operations used by the ANCS client.
///
/// Methods issue a request and return once it is accepted. Completion is
/// reported later through the attached [`TransportEventSink`]. An `Err` means
/// the request could not be issued at all.
#[async_trait]
pub trait Transport: Send {
    /// Installs the sink that receives every asynchronous callback.
    fn attach(&mut self, sink: TransportEventSink);

    async fn start_scan(&mut self) -> Result<(), TransportError>;

    async fn stop_scan(&mut self) -> Result<(), TransportError>;

    async fn connect(&mut self, peer: &PeerId) -> Result<(), TransportError>;

    /// Closes the link and releases every resource held for `peer`.
    async fn disconnect(&mut self, peer: &PeerId) -> Result<(), TransportError>;

    async fn request_mtu(&mut self, peer: &PeerId, mtu: u16) -> Result<(), TransportError>;

    async fn discover_services(&mut self, peer: &PeerId) -> Result<(), TransportError>;

    /// Enables notifications on a characteristic endpoint.
    async fn subscribe(&mut self, peer: &PeerId, endpoint: EndpointId)
    -> Result<(), TransportError>;

    async fn write(
        &mut self,
        peer: &PeerId,
        endpoint: EndpointId,
        payload: &[u8],
    ) -> Result<(), TransportError>;
}
