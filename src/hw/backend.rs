use tracing::info;

use super::btleplug_backend::BtleplugTransport;
use super::fake_backend::{FakeBackendConfig, FakeTransport};
use super::transport::Transport;
use crate::error::TransportError;

/// Runtime transport selection.
#[derive(Debug)]
pub struct TransportBackend {
    kind: BackendKind,
}

#[derive(Debug)]
enum BackendKind {
    Btleplug,
    Fake(FakeBackendConfig),
}

impl TransportBackend {
    /// Selects the real BLE stack.
    #[must_use]
    pub fn btleplug() -> Self {
        Self {
            kind: BackendKind::Btleplug,
        }
    }

    pub(crate) fn fake(config: FakeBackendConfig) -> Self {
        Self {
            kind: BackendKind::Fake(config),
        }
    }

    #[must_use]
    pub fn is_fake(&self) -> bool {
        matches!(self.kind, BackendKind::Fake(_))
    }

    /// Builds the selected transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform BLE manager cannot be created.
    pub async fn into_transport(self) -> Result<Box<dyn Transport>, TransportError> {
        let transport: Box<dyn Transport> = match self.kind {
            BackendKind::Btleplug => Box::new(BtleplugTransport::new().await?),
            BackendKind::Fake(config) => {
                info!("using fake BLE transport");
                Box::new(FakeTransport::new(config))
            }
        };
        Ok(transport)
    }
}
