use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use super::model::{CharacteristicInfo, DiscoveredPeer, PeerId, ServiceInfo};
use super::transport::{
    ConnectionChange, GattStatus, Transport, TransportEvent, TransportEventSink,
};
use crate::error::TransportError;
use crate::protocol::{self, EndpointId};

type PeerTable = Arc<Mutex<HashMap<PeerId, PeerHandle>>>;

#[derive(Debug, Clone)]
struct PeerHandle {
    peripheral: Peripheral,
    characteristics: HashMap<EndpointId, Characteristic>,
}

impl PeerHandle {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: HashMap::new(),
        }
    }
}

/// Transport backed by `btleplug`, using the first available adapter.
///
/// Every request is issued on a spawned task so callbacks reach the client
/// through the event sink, never as direct return values.
#[derive(Debug)]
pub(crate) struct BtleplugTransport {
    manager: Manager,
    adapter: Option<Adapter>,
    peers: PeerTable,
    sink: Option<TransportEventSink>,
    central_pump: Option<CancellationToken>,
    notification_pumps: HashMap<PeerId, CancellationToken>,
}

impl BtleplugTransport {
    /// Creates the real BLE transport.
    pub(crate) async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        Ok(Self {
            manager,
            adapter: None,
            peers: PeerTable::default(),
            sink: None,
            central_pump: None,
            notification_pumps: HashMap::new(),
        })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapter(&mut self) -> Result<Adapter, TransportError> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let adapter = self
            .manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapters)?;
        let adapter_info = adapter.adapter_info().await?;
        info!(adapter = %adapter_info, "using BLE adapter");
        self.start_central_pump(&adapter).await?;
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    /// Forwards adapter events for the lifetime of the transport.
    async fn start_central_pump(&mut self, adapter: &Adapter) -> Result<(), TransportError> {
        let mut events = adapter.events().await?;
        let sink = self.sink()?;
        let peers = Arc::clone(&self.peers);
        let adapter = adapter.clone();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = cancelled.cancelled() => break,
                    event = events.next() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let peripheral = match adapter.peripheral(&id).await {
                            Ok(peripheral) => peripheral,
                            Err(error) => {
                                debug!(%error, "failed to resolve scanned peripheral");
                                continue;
                            }
                        };
                        let properties = match peripheral.properties().await {
                            Ok(Some(properties)) => properties,
                            Ok(None) => continue,
                            Err(error) => {
                                debug!(%error, "failed to read advertisement properties");
                                continue;
                            }
                        };

                        let peer_id = PeerId::from(id.to_string());
                        peers
                            .lock()
                            .await
                            .entry(peer_id.clone())
                            .or_insert_with(|| PeerHandle::new(peripheral));
                        sink.post(TransportEvent::ScanResult(discovered_peer(
                            peer_id, properties,
                        )));
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        sink.post(TransportEvent::ConnectionState {
                            peer: PeerId::from(id.to_string()),
                            change: ConnectionChange::Disconnected,
                        });
                    }
                    other => trace!(event = ?other, "ignoring adapter event"),
                }
            }
            debug!("adapter event stream closed");
        });

        self.central_pump = Some(token);
        Ok(())
    }

    fn sink(&self) -> Result<TransportEventSink, TransportError> {
        self.sink.clone().ok_or(TransportError::Detached)
    }

    async fn peer(&self, peer: &PeerId) -> Result<PeerHandle, TransportError> {
        self.peers
            .lock()
            .await
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer { peer: peer.clone() })
    }

    async fn characteristic(
        &self,
        peer: &PeerId,
        endpoint: EndpointId,
    ) -> Result<(Peripheral, Characteristic), TransportError> {
        let handle = self.peer(peer).await?;
        let characteristic = handle.characteristics.get(&endpoint).cloned().ok_or_else(|| {
            TransportError::MissingEndpoint {
                peer: peer.clone(),
                endpoint,
            }
        })?;
        Ok((handle.peripheral, characteristic))
    }

    /// Starts forwarding value notifications for `peer`, once per connection.
    async fn ensure_notification_pump(
        &mut self,
        peer: &PeerId,
        peripheral: &Peripheral,
    ) -> Result<(), TransportError> {
        if self.notification_pumps.contains_key(peer) {
            return Ok(());
        }

        let mut notifications = peripheral.notifications().await?;
        let sink = self.sink()?;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let peer_id = peer.clone();

        tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    () = cancelled.cancelled() => break,
                    notification = notifications.next() => match notification {
                        Some(notification) => notification,
                        None => break,
                    },
                };

                let uuid = notification.uuid.to_string();
                let Some(endpoint) = protocol::characteristic_for_uuid(&uuid) else {
                    trace!(%uuid, "ignoring notification from unrelated characteristic");
                    continue;
                };
                sink.post(TransportEvent::CharacteristicChanged {
                    peer: peer_id.clone(),
                    endpoint,
                    value: notification.value,
                });
            }
            debug!(peer = %peer_id, "notification stream closed");
        });

        self.notification_pumps.insert(peer.clone(), token);
        Ok(())
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    fn attach(&mut self, sink: TransportEventSink) {
        self.sink = Some(sink);
    }

    #[instrument(skip(self), level = "debug")]
    async fn start_scan(&mut self) -> Result<(), TransportError> {
        let adapter = self.adapter().await?;
        adapter.start_scan(ScanFilter::default()).await?;
        info!("BLE scan started");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        if let Some(adapter) = &self.adapter {
            adapter.stop_scan().await?;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(peer = %peer))]
    async fn connect(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        let handle = self.peer(peer).await?;
        let sink = self.sink()?;
        let peer = peer.clone();

        tokio::spawn(async move {
            let change = match handle.peripheral.connect().await {
                Ok(()) => ConnectionChange::Connected,
                Err(error) => ConnectionChange::ConnectFailed {
                    reason: error.to_string(),
                },
            };
            sink.post(TransportEvent::ConnectionState { peer, change });
        });
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(peer = %peer))]
    async fn disconnect(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        if let Some(token) = self.notification_pumps.remove(peer) {
            token.cancel();
        }
        let Some(handle) = self.peers.lock().await.get_mut(peer).map(|handle| {
            handle.characteristics.clear();
            handle.clone()
        }) else {
            return Ok(());
        };

        tokio::spawn(async move {
            if let Err(error) = handle.peripheral.disconnect().await {
                debug!(%error, "failed to disconnect cleanly");
            }
        });
        Ok(())
    }

    async fn request_mtu(&mut self, peer: &PeerId, mtu: u16) -> Result<(), TransportError> {
        // btleplug leaves ATT MTU negotiation to the platform stack.
        debug!(%peer, requested = mtu, "MTU negotiation is handled by the platform");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(peer = %peer))]
    async fn discover_services(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        let handle = self.peer(peer).await?;
        let sink = self.sink()?;
        let peers = Arc::clone(&self.peers);
        let peer = peer.clone();

        tokio::spawn(async move {
            let outcome = match handle.peripheral.discover_services().await {
                Ok(()) => {
                    let (services, characteristics) =
                        collect_services_and_characteristics(&handle.peripheral);
                    if let Some(entry) = peers.lock().await.get_mut(&peer) {
                        entry.characteristics = characteristics;
                    }
                    Ok(services)
                }
                Err(error) => Err(error.to_string()),
            };
            sink.post(TransportEvent::ServicesDiscovered { peer, outcome });
        });
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(peer = %peer, %endpoint))]
    async fn subscribe(
        &mut self,
        peer: &PeerId,
        endpoint: EndpointId,
    ) -> Result<(), TransportError> {
        let (peripheral, characteristic) = self.characteristic(peer, endpoint).await?;
        self.ensure_notification_pump(peer, &peripheral).await?;
        let sink = self.sink()?;
        let peer = peer.clone();

        tokio::spawn(async move {
            let status = GattStatus::from(peripheral.subscribe(&characteristic).await);
            sink.post(TransportEvent::SubscriptionWritten {
                peer,
                endpoint,
                status,
            });
        });
        Ok(())
    }

    #[instrument(skip(self, payload), level = "debug", fields(peer = %peer, %endpoint, len = payload.len()))]
    async fn write(
        &mut self,
        peer: &PeerId,
        endpoint: EndpointId,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let (peripheral, characteristic) = self.characteristic(peer, endpoint).await?;
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        let sink = self.sink()?;
        let peer = peer.clone();
        let payload = payload.to_vec();

        tokio::spawn(async move {
            let status =
                GattStatus::from(peripheral.write(&characteristic, &payload, write_type).await);
            sink.post(TransportEvent::CharacteristicWritten {
                peer,
                endpoint,
                status,
            });
        });
        Ok(())
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(token) = self.central_pump.take() {
            token.cancel();
        }
        for (_, token) in self.notification_pumps.drain() {
            token.cancel();
        }
    }
}

fn discovered_peer(peer_id: PeerId, properties: PeripheralProperties) -> DiscoveredPeer {
    DiscoveredPeer::new(peer_id, properties.local_name, properties.rssi)
        .with_manufacturer_ids(properties.manufacturer_data.keys().copied().collect())
}

fn collect_services_and_characteristics(
    peripheral: &Peripheral,
) -> (Vec<ServiceInfo>, HashMap<EndpointId, Characteristic>) {
    let mut services = Vec::new();
    let mut characteristics_by_endpoint = HashMap::new();

    for service in peripheral.services() {
        let mut characteristics = Vec::new();
        for characteristic in &service.characteristics {
            let characteristic_uuid = characteristic.uuid.to_string().to_lowercase();
            if let Some(endpoint) = protocol::characteristic_for_uuid(&characteristic_uuid) {
                characteristics_by_endpoint
                    .entry(endpoint)
                    .or_insert_with(|| characteristic.clone());
            }
            characteristics.push(CharacteristicInfo::new(
                characteristic_uuid,
                property_labels(characteristic.properties),
            ));
        }
        characteristics.sort_by(|left, right| left.uuid().cmp(right.uuid()));

        services.push(ServiceInfo::new(
            service.uuid.to_string().to_lowercase(),
            service.primary,
            characteristics,
        ));
    }
    services.sort_by(|left, right| left.uuid().cmp(right.uuid()));

    (services, characteristics_by_endpoint)
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    let labels: Vec<String> = flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if labels.is_empty() {
        vec!["none".to_string()]
    } else {
        labels
    }
}
