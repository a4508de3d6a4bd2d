use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use strum_macros::Display;
use tracing::level_filters::LevelFilter;

use crate::cli::decode::DecodeArgs;
use crate::cli::encode::EncodeCommand;
use crate::cli::listen::ListenArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{DEFAULT_FAKE_EVENT_DELAY, FakeBackendConfig, HexPayloads, ScanFixture};

/// Command-line options for the ANCS client.
#[derive(Debug, Parser)]
#[command(
    name = "ancs",
    about = "Receive iOS notifications over the Apple Notification Center Service."
)]
pub struct Args {
    /// Log verbosity. Overrides `RUST_LOG` when set.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long = "output", global = true, value_enum)]
    output_format: Option<OutputFormat>,
    /// Uses the fake BLE transport with fixture-driven peers.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake peers in the form `peer|name|rssi|profile;...` (`-` for no name or RSSI).
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Notification-source frames replayed after subscribing, as comma-separated hex.
    #[arg(long, global = true, requires = "fake")]
    fake_events: Option<HexPayloads>,
    /// Data-source responses matched to attribute requests by UID, as comma-separated hex.
    #[arg(long, global = true, requires = "fake")]
    fake_responses: Option<HexPayloads>,
    /// Delay between subscribing and replaying fake events (e.g. `500ms`, `4s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_event_delay: Option<Duration>,
    /// Delay between starting a scan and reporting fake peers.
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use ancs::{Args, Command, ListenArgs};
    ///
    /// let listen = Args::new(Command::Listen(ListenArgs::new(Some(2))));
    /// let _ = listen;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output_format: None,
            fake: false,
            fake_scan: None,
            fake_events: None,
            fake_responses: None,
            fake_event_delay: None,
            fake_discovery_delay: None,
            command,
        }
    }

    /// Enables fake transport mode with pre-parsed fixtures.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan,
            events,
            responses,
            event_delay,
            discovery_delay,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan);
        self.fake_events = events;
        self.fake_responses = responses;
        self.fake_event_delay = Some(event_delay);
        self.fake_discovery_delay = Some(discovery_delay);
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = Some(output_format);
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the explicitly requested output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    /// Splits parsed arguments into the command and optional fake transport settings.
    ///
    /// # Errors
    ///
    /// Returns an error if fake mode is enabled without a scan fixture.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_events,
            fake_responses,
            fake_event_delay,
            fake_discovery_delay,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan,
                events: fake_events,
                responses: fake_responses,
                event_delay: fake_event_delay.unwrap_or(DEFAULT_FAKE_EVENT_DELAY),
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake transport fixtures for programmatic runs.
///
/// ```
/// let fake = ancs::FakeArgs::builder()
///     .scan("AA|ANCS-Phone|-40|ancs")?
///     .events("0002040101000000")?
///     .build();
/// let _ = fake;
/// # Ok::<(), ancs::FixtureError>(())
/// ```
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    scan: ScanFixture,
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    events: Option<HexPayloads>,
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    responses: Option<HexPayloads>,
    #[builder(default = DEFAULT_FAKE_EVENT_DELAY)]
    event_delay: Duration,
    #[builder(default)]
    discovery_delay: Duration,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan,
            events,
            responses,
            event_delay,
            discovery_delay,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan)
            .maybe_event_frames(events)
            .maybe_attribute_responses(responses)
            .event_delay(event_delay)
            .discovery_delay(discovery_delay)
            .build()
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// Coloured tables and lines for humans.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan for an ANCS peer, subscribe, and print notifications as they arrive.
    Listen(ListenArgs),
    /// Decode one 8-byte notification-source frame given as hex.
    DecodeEvent(DecodeArgs),
    /// Decode one data-source attribute response given as hex.
    DecodeResponse(DecodeArgs),
    /// Print control-point command bytes.
    #[command(subcommand)]
    Encode(EncodeCommand),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Listen(_args) => "listen",
            Self::DecodeEvent(_args) => "decode-event",
            Self::DecodeResponse(_args) => "decode-response",
            Self::Encode(_command) => "encode",
        }
    }
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
