use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::ui::Painter;
use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::hw::TransportBackend;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Selects the real BLE transport.
#[must_use]
pub fn real_transport_backend() -> TransportBackend {
    TransportBackend::btleplug()
}

/// Selects the fake transport driven by fixtures.
#[must_use]
pub fn fake_transport_backend(fake_args: FakeArgs) -> TransportBackend {
    TransportBackend::fake(fake_args.into_backend_config())
}

/// Runs a CLI command against the selected transport.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = ancs::Args::try_parse_from(["ancs", "encode", "get-attributes", "300"])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let backend = match maybe_fake_args {
///     Some(fake_args) => ancs::fake_transport_backend(fake_args),
///     None => ancs::real_transport_backend(),
/// };
/// let mut out = Vec::new();
/// ancs::run(command, &mut out, backend, ancs::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails,
/// decoding fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    backend: TransportBackend,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, backend, None, output_format).await
}

/// Runs a CLI command with an explicit log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails,
/// decoding fails, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    backend: TransportBackend,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        backend,
        log_level,
        output_format,
    )
    .await
}

/// Runs a CLI command with an injected terminal client.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails,
/// decoding fails, or output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    backend: TransportBackend,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(command, out, terminal_client, backend, None, output_format)
        .await
}

/// Runs a CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct PlainTerminal;
/// impl ancs::TerminalClient for PlainTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = ancs::Args::try_parse_from([
///     "ancs",
///     "--log-level",
///     "debug",
///     "decode-event",
///     "0002040101000000",
/// ])?;
/// let log_level = args.log_level();
/// let (command, _fake) = args.into_command_and_fake_args()?;
/// let mut out = Vec::new();
/// ancs::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &PlainTerminal,
///     ancs::real_transport_backend(),
///     log_level,
///     ancs::OutputFormat::Pretty,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails,
/// decoding fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, backend),
    level = "info",
    fields(command = %command.name(), fake = backend.is_fake(), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    backend: TransportBackend,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "ancs",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;
    let painter = Painter::new(terminal_client.stdout_is_terminal());

    match command {
        Command::Listen(args) => {
            let transport = backend.into_transport().await?;
            crate::cli::listen::run(transport, &args, out, output_format, &painter).await
        }
        Command::DecodeEvent(args) => {
            crate::cli::decode::run_event(&args, out, output_format, &painter)
        }
        Command::DecodeResponse(args) => {
            crate::cli::decode::run_response(&args, out, output_format, &painter)
        }
        Command::Encode(command) => {
            crate::cli::encode::run(&command, out, output_format, &painter)
        }
    }
}
