use std::collections::HashMap;
use std::sync::LazyLock;

use serde_with::SerializeDisplay;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Bluetooth SIG company identifier assigned to Apple.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// ATT MTU requested right after a connection is established.
pub const REQUESTED_ATT_MTU: u16 = 512;

/// Known ANCS GATT endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display, SerializeDisplay)]
pub enum EndpointId {
    /// Apple Notification Center Service.
    #[strum(to_string = "ancs_service")]
    AncsService,
    /// Compact 8-byte notification event stream.
    #[strum(to_string = "notification_source")]
    NotificationSource,
    /// Command sink for attribute requests and actions.
    #[strum(to_string = "control_point")]
    ControlPoint,
    /// Variable-length attribute response stream.
    #[strum(to_string = "data_source")]
    DataSource,
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    #[strum(to_string = "service")]
    Service,
    #[strum(to_string = "characteristic")]
    Characteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
    kind: EndpointKind,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Lowercase endpoint UUID.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }

    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }
}

static CHARACTERISTICS_BY_UUID: LazyLock<HashMap<&'static str, EndpointId>> =
    LazyLock::new(|| {
        characteristic_endpoints()
            .map(|endpoint| (endpoint_metadata(endpoint).uuid(), endpoint))
            .collect()
    });

/// Returns the characteristic endpoints carried by the ANCS service.
pub(crate) fn characteristic_endpoints() -> impl Iterator<Item = EndpointId> {
    EndpointId::iter()
        .filter(|endpoint| endpoint_metadata(*endpoint).kind() == EndpointKind::Characteristic)
}

/// Maps a characteristic UUID back to its endpoint, ignoring case.
pub(crate) fn characteristic_for_uuid(uuid: &str) -> Option<EndpointId> {
    CHARACTERISTICS_BY_UUID
        .get(uuid.to_ascii_lowercase().as_str())
        .copied()
}

/// Returns metadata for one endpoint.
pub(crate) const fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::AncsService => EndpointMetadata {
            name: "ANCS service",
            uuid: "7905f431-b5ce-4e99-a40f-4b1e122d00d0",
            kind: EndpointKind::Service,
        },
        EndpointId::NotificationSource => EndpointMetadata {
            name: "ANCS notification source",
            uuid: "9fbf120d-6301-42d9-8c58-25e699a21dbd",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::ControlPoint => EndpointMetadata {
            name: "ANCS control point",
            uuid: "69d1d8f3-45e1-49a8-9821-9bbdfdaad9d9",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::DataSource => EndpointMetadata {
            name: "ANCS data source",
            uuid: "22eac6e9-24d6-4bb5-be44-b36ace7c7bfb",
            kind: EndpointKind::Characteristic,
        },
    }
}
