mod backend;
mod btleplug_backend;
mod endpoints;
mod fake_backend;
mod model;
mod transport;

pub use self::backend::TransportBackend;
pub use self::endpoints::AncsEndpoints;
pub(crate) use self::endpoints::{ancs_service_table, negotiate_ancs_endpoints};
pub use self::fake_backend::DEFAULT_FAKE_EVENT_DELAY;
pub(crate) use self::fake_backend::{FakeBackendConfig, HexPayloads, ScanFixture};
pub use self::model::{CharacteristicInfo, DiscoveredPeer, PeerId, ServiceInfo};
pub use self::transport::{
    ConnectionChange, GattStatus, Transport, TransportEvent, TransportEventSink,
};
