use derive_more::From;
use thiserror::Error;

use crate::codec::CodecError;
use crate::hw::PeerId;
use crate::protocol::{EndpointId, endpoint_metadata};

/// Errors returned by BLE transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("peer `{peer}` has not been seen in a scan")]
    UnknownPeer { peer: PeerId },
    #[error(
        "required endpoint `{name}` ({uuid}) was not found on peer `{peer}`",
        name = endpoint_metadata(*endpoint).name(),
        uuid = endpoint_metadata(*endpoint).uuid()
    )]
    MissingEndpoint { peer: PeerId, endpoint: EndpointId },
    #[error("required ANCS endpoints are missing: {missing}")]
    MissingRequiredEndpoints { missing: String },
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
    #[error("the client task stopped unexpectedly")]
    ClientStopped,
    #[error("the transport has no event sink attached")]
    Detached,
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake transport fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake scan fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("invalid hex payload")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("unknown fake peer profile `{value}`; expected ancs, plain, stall or fail")]
    UnknownProfile { value: String },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum AncsError {
    #[error(transparent)]
    #[from(CodecError, Box<CodecError>)]
    Codec(Box<CodecError>),
    #[error(transparent)]
    #[from(TransportError, Box<TransportError>)]
    Transport(Box<TransportError>),
    #[error(transparent)]
    #[from(FixtureError, Box<FixtureError>)]
    Fixture(Box<FixtureError>),
}
