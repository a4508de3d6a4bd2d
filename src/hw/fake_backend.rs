use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::endpoints::ancs_service_table;
use super::model::{CharacteristicInfo, DiscoveredPeer, PeerId, ServiceInfo};
use super::transport::{
    ConnectionChange, GattStatus, Transport, TransportEvent, TransportEventSink,
};
use crate::codec::AttributeKind;
use crate::command::CommandId;
use crate::error::{FixtureError, TransportError};
use crate::protocol::{APPLE_COMPANY_ID, EndpointId};

/// Default delay before fixture events are replayed; clears the ignore window.
pub const DEFAULT_FAKE_EVENT_DELAY: Duration = Duration::from_secs(4);

const DEFAULT_NEGOTIATED_MTU: u16 = 185;
const BATTERY_SERVICE_UUID: &str = "0000180f-0000-1000-8000-00805f9b34fb";
const BATTERY_LEVEL_UUID: &str = "00002a19-0000-1000-8000-00805f9b34fb";

/// Social added (important, uid 1) followed by email added (uid 2).
const DEFAULT_EVENT_FRAMES: [[u8; 8]; 2] = [
    [0x00, 0x02, 0x04, 0x01, 0x01, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x06, 0x01, 0x02, 0x00, 0x00, 0x00],
];

/// How a fixture peer behaves once connected.
#[derive(Debug, Clone, Copy, Eq, PartialEq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum FakePeerProfile {
    /// Exposes a complete ANCS service and Apple manufacturer data.
    Ancs,
    /// Connects but exposes no ANCS service.
    Plain,
    /// Connects but never completes service discovery.
    Stall,
    /// Refuses connections.
    Fail,
}

impl FromStr for FakePeerProfile {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ancs" => Ok(Self::Ancs),
            "plain" => Ok(Self::Plain),
            "stall" => Ok(Self::Stall),
            "fail" => Ok(Self::Fail),
            _ => Err(FixtureError::UnknownProfile {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct FakePeer {
    advert: DiscoveredPeer,
    profile: FakePeerProfile,
}

/// Parsed `peer|name|rssi|profile` records separated by `;`.
#[derive(Debug, Clone)]
pub(crate) struct ScanFixture {
    peers: Vec<FakePeer>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }

        let peers = value
            .split(';')
            .map(parse_scan_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { peers })
    }
}

/// Comma-separated hex payloads.
#[derive(Debug, Clone, Default, derive_more::Into)]
pub(crate) struct HexPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for HexPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Ok(Self::default());
        }

        let payloads = value
            .split(',')
            .map(|payload| {
                let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                hex::decode(cleaned)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { payloads })
    }
}

/// Settings for constructing a fake transport.
#[derive(Debug, Clone, Builder)]
pub(crate) struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    event_frames: Option<HexPayloads>,
    attribute_responses: Option<HexPayloads>,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default = DEFAULT_FAKE_EVENT_DELAY)]
    event_delay: Duration,
}

/// In-process transport that scripts peers from fixtures.
///
/// Attribute requests are answered from the response fixtures when one
/// matches the requested UID, otherwise with a generated response.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    peers: Vec<FakePeer>,
    event_frames: Vec<Vec<u8>>,
    attribute_responses: Vec<Vec<u8>>,
    discovery_delay: Duration,
    event_delay: Duration,
    sink: Option<TransportEventSink>,
    scan: Option<CancellationToken>,
    replays: HashMap<PeerId, CancellationToken>,
}

impl FakeTransport {
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        let event_frames = config.event_frames.map_or_else(
            || DEFAULT_EVENT_FRAMES.map(Vec::from).to_vec(),
            Into::into,
        );

        Self {
            peers: config.scan_fixture.peers,
            event_frames,
            attribute_responses: config.attribute_responses.map(Into::into).unwrap_or_default(),
            discovery_delay: config.discovery_delay,
            event_delay: config.event_delay,
            sink: None,
            scan: None,
            replays: HashMap::new(),
        }
    }

    fn sink(&self) -> Result<TransportEventSink, TransportError> {
        self.sink.clone().ok_or(TransportError::Detached)
    }

    fn post(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.sink()?.post(event);
        Ok(())
    }

    fn profile(&self, peer: &PeerId) -> Result<FakePeerProfile, TransportError> {
        self.peers
            .iter()
            .find(|candidate| candidate.advert.peer_id() == peer)
            .map(|candidate| candidate.profile)
            .ok_or_else(|| TransportError::UnknownPeer { peer: peer.clone() })
    }

    fn attribute_response(&self, uid: u32) -> Vec<u8> {
        let uid_bytes = uid.to_le_bytes();
        self.attribute_responses
            .iter()
            .find(|response| response.get(1..5) == Some(&uid_bytes[..]))
            .cloned()
            .unwrap_or_else(|| generated_attribute_response(uid))
    }

    fn start_replay(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        if self.replays.contains_key(peer) {
            return Ok(());
        }

        let sink = self.sink()?;
        let frames = self.event_frames.clone();
        let delay = self.event_delay;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let peer_id = peer.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => debug!(peer = %peer_id, "fake event replay cancelled"),
                () = sleep(delay) => {
                    for value in frames {
                        sink.post(TransportEvent::CharacteristicChanged {
                            peer: peer_id.clone(),
                            endpoint: EndpointId::NotificationSource,
                            value,
                        });
                    }
                }
            }
        });
        self.replays.insert(peer.clone(), token);
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn attach(&mut self, sink: TransportEventSink) {
        self.sink = Some(sink);
    }

    #[instrument(skip(self), level = "debug")]
    async fn start_scan(&mut self) -> Result<(), TransportError> {
        if let Some(previous) = self.scan.take() {
            previous.cancel();
        }

        let sink = self.sink()?;
        let adverts: Vec<DiscoveredPeer> =
            self.peers.iter().map(|peer| peer.advert.clone()).collect();
        let delay = self.discovery_delay;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = sleep(delay) => {
                    for advert in adverts {
                        sink.post(TransportEvent::ScanResult(advert));
                    }
                }
            }
        });
        self.scan = Some(token);
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        if let Some(scan) = self.scan.take() {
            scan.cancel();
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(peer = %peer))]
    async fn connect(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        let change = match self.profile(peer)? {
            FakePeerProfile::Fail => ConnectionChange::ConnectFailed {
                reason: "fixture peer refuses connections".to_string(),
            },
            _ => ConnectionChange::Connected,
        };
        self.post(TransportEvent::ConnectionState {
            peer: peer.clone(),
            change,
        })
    }

    async fn disconnect(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        if let Some(replay) = self.replays.remove(peer) {
            replay.cancel();
        }
        Ok(())
    }

    async fn request_mtu(&mut self, peer: &PeerId, mtu: u16) -> Result<(), TransportError> {
        self.post(TransportEvent::MtuChanged {
            peer: peer.clone(),
            mtu: mtu.min(DEFAULT_NEGOTIATED_MTU),
            status: GattStatus::Success,
        })
    }

    #[instrument(skip(self), level = "debug", fields(peer = %peer))]
    async fn discover_services(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        let services = match self.profile(peer)? {
            FakePeerProfile::Ancs => ancs_service_table(),
            FakePeerProfile::Plain | FakePeerProfile::Fail => battery_service_table(),
            FakePeerProfile::Stall => {
                debug!("fixture peer never completes service discovery");
                return Ok(());
            }
        };
        self.post(TransportEvent::ServicesDiscovered {
            peer: peer.clone(),
            outcome: Ok(services),
        })
    }

    async fn subscribe(
        &mut self,
        peer: &PeerId,
        endpoint: EndpointId,
    ) -> Result<(), TransportError> {
        self.post(TransportEvent::SubscriptionWritten {
            peer: peer.clone(),
            endpoint,
            status: GattStatus::Success,
        })?;
        if endpoint == EndpointId::NotificationSource {
            self.start_replay(peer)?;
        }
        Ok(())
    }

    #[instrument(skip(self, payload), level = "debug", fields(peer = %peer, %endpoint))]
    async fn write(
        &mut self,
        peer: &PeerId,
        endpoint: EndpointId,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.post(TransportEvent::CharacteristicWritten {
            peer: peer.clone(),
            endpoint,
            status: GattStatus::Success,
        })?;

        if endpoint != EndpointId::ControlPoint {
            return Ok(());
        }
        match payload {
            [command, uid0, uid1, uid2, uid3, ..]
                if *command == CommandId::GetNotificationAttributes.as_raw() =>
            {
                let uid = u32::from_le_bytes([*uid0, *uid1, *uid2, *uid3]);
                self.post(TransportEvent::CharacteristicChanged {
                    peer: peer.clone(),
                    endpoint: EndpointId::DataSource,
                    value: self.attribute_response(uid),
                })
            }
            _ => {
                warn!(len = payload.len(), "fake control point ignored command");
                Ok(())
            }
        }
    }
}

fn parse_scan_record(raw_record: &str) -> Result<FakePeer, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [peer_id, name, rssi, profile] = fields[..] else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if peer_id.is_empty() || name.is_empty() || rssi.is_empty() || profile.is_empty() {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = (name != "-").then(|| name.to_string());
    let rssi = if rssi == "-" {
        None
    } else {
        Some(rssi.parse::<i16>()?)
    };
    let profile = profile.parse::<FakePeerProfile>()?;

    let mut advert = DiscoveredPeer::new(PeerId::from(peer_id), local_name, rssi);
    if profile == FakePeerProfile::Ancs {
        advert = advert.with_manufacturer_ids(vec![APPLE_COMPANY_ID]);
    }
    Ok(FakePeer { advert, profile })
}

fn generated_attribute_response(uid: u32) -> Vec<u8> {
    let mut response = vec![CommandId::GetNotificationAttributes.as_raw()];
    response.extend_from_slice(&uid.to_le_bytes());

    let attributes = [
        (AttributeKind::AppIdentifier, "com.example.fake".to_string()),
        (AttributeKind::Title, format!("Fake title {uid}")),
        (AttributeKind::Message, format!("Fake message {uid}")),
    ];
    for (kind, value) in attributes {
        let length = u16::try_from(value.len()).unwrap_or(u16::MAX);
        response.push(kind.as_raw());
        response.extend_from_slice(&length.to_le_bytes());
        response.extend_from_slice(value.as_bytes());
    }
    response
}

fn battery_service_table() -> Vec<ServiceInfo> {
    vec![ServiceInfo::new(
        BATTERY_SERVICE_UUID.to_string(),
        true,
        vec![CharacteristicInfo::new(
            BATTERY_LEVEL_UUID.to_string(),
            vec!["read".to_string(), "notify".to_string()],
        )],
    )]
}
