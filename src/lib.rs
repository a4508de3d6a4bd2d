//! Apple Notification Center Service client.
//!
//! Discovers an iOS peer over BLE, subscribes to its notification and data
//! sources, decodes notification events and requests their attributes. The
//! wire codecs and the lifecycle state machine are usable on their own; the
//! [`AncsClient`] binds them to a [`Transport`].

mod app;
mod assembler;
mod cli;
mod client;
mod codec;
mod command;
mod error;
mod hw;
mod lifecycle;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    fake_transport_backend, real_transport_backend, run, run_with_clients,
    run_with_clients_and_log_level, run_with_log_level,
};
pub use assembler::{Attribute, AttributeRecord, MISSING_ATTRIBUTE, parse_response};
pub use cli::{
    Args, Command, DecodeArgs, EncodeCommand, FakeArgs, ListenArgs, LogLevel, OutputFormat,
};
pub use client::{AncsClient, ClientHandle, RunningClient};
pub use codec::{
    AttributeHeader, AttributeKind, Category, CodecError, EVENT_FRAME_LEN, EventFlags, EventKind,
    NotificationEvent, UNDECODABLE_SENTINEL, decode_attribute_header, decode_attribute_value,
    decode_event,
};
pub use command::{
    ActionId, CommandBuilder, CommandId, GET_ATTRIBUTES_COMMAND_LEN, PERFORM_ACTION_COMMAND_LEN,
    REQUESTED_ATTRIBUTES,
};
pub use error::{AncsError, FixtureError, TransportError};
pub use hw::{
    AncsEndpoints, CharacteristicInfo, ConnectionChange, DEFAULT_FAKE_EVENT_DELAY, DiscoveredPeer,
    GattStatus, PeerId, ServiceInfo, Transport, TransportBackend, TransportEvent,
    TransportEventSink,
};
pub use lifecycle::{
    Action, AttributeRequestPolicy, CandidatePolicy, ClientCommand, ClientOutput,
    ConnectionSession, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_IGNORE_WINDOW, DEFAULT_NAME_NEEDLE,
    DEFAULT_SCAN_DURATION, DEFAULT_SETTLE_DELAY, Generation, Input, LifecycleConfig,
    LifecycleMachine, ScanCampaign, SessionFailure, SessionState, StateChange, StatusUpdate,
    TimerKind, accept,
};
pub use protocol::{APPLE_COMPANY_ID, EndpointId, REQUESTED_ATT_MTU};
pub use terminal::TerminalClient;
