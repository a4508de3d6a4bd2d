use serde::Serialize;

use crate::protocol::APPLE_COMPANY_ID;

/// Opaque transport-level handle for one peer.
#[derive(
    Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One advertisement observed while scanning.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DiscoveredPeer {
    peer_id: PeerId,
    local_name: Option<String>,
    rssi: Option<i16>,
    manufacturer_ids: Vec<u16>,
}

impl DiscoveredPeer {
    /// Creates a discovered-peer record.
    #[must_use]
    pub fn new(peer_id: PeerId, local_name: Option<String>, rssi: Option<i16>) -> Self {
        Self {
            peer_id,
            local_name,
            rssi,
            manufacturer_ids: Vec::new(),
        }
    }

    /// Attaches the company ids found in manufacturer-specific advertising data.
    #[must_use]
    pub fn with_manufacturer_ids(mut self, mut manufacturer_ids: Vec<u16>) -> Self {
        manufacturer_ids.sort_unstable();
        self.manufacturer_ids = manufacturer_ids;
        self
    }

    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    #[must_use]
    pub fn manufacturer_ids(&self) -> &[u16] {
        &self.manufacturer_ids
    }

    /// Returns whether the advertisement carries Apple manufacturer data.
    #[must_use]
    pub fn is_apple_device(&self) -> bool {
        self.manufacturer_ids.contains(&APPLE_COMPANY_ID)
    }
}

/// A characteristic description discovered on a connected peer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicInfo {
    uuid: String,
    properties: Vec<String>,
}

impl CharacteristicInfo {
    /// Creates a characteristic description.
    #[must_use]
    pub fn new(uuid: String, properties: Vec<String>) -> Self {
        Self { uuid, properties }
    }

    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Property labels such as `notify` or `write`.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub(crate) fn has_property(&self, property: &str) -> bool {
        self.properties
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(property))
    }
}

/// A GATT service with discovered characteristics.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServiceInfo {
    uuid: String,
    primary: bool,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Creates a service description.
    #[must_use]
    pub fn new(uuid: String, primary: bool, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid,
            primary,
            characteristics,
        }
    }

    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }
}
