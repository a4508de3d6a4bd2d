use std::collections::HashMap;

use tracing::instrument;

use super::model::{CharacteristicInfo, ServiceInfo};
use crate::error::TransportError;
use crate::protocol::{self, EndpointId};

/// ANCS endpoints resolved from a discovered service table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AncsEndpoints {
    uuids: HashMap<EndpointId, String>,
}

impl AncsEndpoints {
    /// Returns the lowercase UUID resolved for an endpoint.
    #[must_use]
    pub fn uuid(&self, endpoint: EndpointId) -> Option<&str> {
        self.uuids.get(&endpoint).map(String::as_str)
    }
}

/// Verifies that the ANCS service and its three characteristics are usable.
///
/// The notification and data sources must notify (or indicate); the control
/// point must accept writes.
#[instrument(skip(services), level = "debug", fields(service_count = services.len()))]
pub(crate) fn negotiate_ancs_endpoints(
    services: &[ServiceInfo],
) -> Result<AncsEndpoints, TransportError> {
    let service_uuid = protocol::endpoint_metadata(EndpointId::AncsService).uuid();
    let Some(service) = services
        .iter()
        .find(|service| service.uuid().eq_ignore_ascii_case(service_uuid))
    else {
        return Err(missing(&[
            EndpointId::AncsService,
            EndpointId::NotificationSource,
            EndpointId::ControlPoint,
            EndpointId::DataSource,
        ]));
    };

    let mut uuids = HashMap::from([(EndpointId::AncsService, service.uuid().to_ascii_lowercase())]);
    let mut absent = Vec::new();
    for endpoint in protocol::characteristic_endpoints() {
        match find_usable_characteristic(service, endpoint) {
            Some(characteristic) => {
                uuids.insert(endpoint, characteristic.uuid().to_ascii_lowercase());
            }
            None => absent.push(endpoint),
        }
    }

    if absent.is_empty() {
        Ok(AncsEndpoints { uuids })
    } else {
        Err(missing(&absent))
    }
}

fn find_usable_characteristic(
    service: &ServiceInfo,
    endpoint: EndpointId,
) -> Option<&CharacteristicInfo> {
    let uuid = protocol::endpoint_metadata(endpoint).uuid();
    let characteristic = service
        .characteristics()
        .iter()
        .find(|characteristic| characteristic.uuid().eq_ignore_ascii_case(uuid))?;

    let usable = match endpoint {
        EndpointId::ControlPoint => {
            characteristic.has_property("write")
                || characteristic.has_property("write_without_response")
        }
        EndpointId::NotificationSource | EndpointId::DataSource => {
            characteristic.has_property("notify") || characteristic.has_property("indicate")
        }
        EndpointId::AncsService => false,
    };
    usable.then_some(characteristic)
}

fn missing(endpoints: &[EndpointId]) -> TransportError {
    TransportError::MissingRequiredEndpoints {
        missing: format_missing_endpoints(endpoints),
    }
}

fn format_missing_endpoints(endpoints: &[EndpointId]) -> String {
    endpoints
        .iter()
        .map(|endpoint| {
            let metadata = protocol::endpoint_metadata(*endpoint);
            format!("{} ({})", metadata.name(), metadata.uuid())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the service table a compliant ANCS peer exposes.
pub(crate) fn ancs_service_table() -> Vec<ServiceInfo> {
    let characteristic = |endpoint: EndpointId, properties: &[&str]| {
        CharacteristicInfo::new(
            protocol::endpoint_metadata(endpoint).uuid().to_string(),
            properties.iter().map(|property| (*property).to_string()).collect(),
        )
    };

    vec![ServiceInfo::new(
        protocol::endpoint_metadata(EndpointId::AncsService)
            .uuid()
            .to_string(),
        true,
        vec![
            characteristic(EndpointId::NotificationSource, &["notify"]),
            characteristic(EndpointId::ControlPoint, &["write"]),
            characteristic(EndpointId::DataSource, &["notify"]),
        ],
    )]
}
