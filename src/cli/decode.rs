use std::io;
use std::str::FromStr;

use anyhow::Result;
use clap::Args;
use tracing::instrument;

use crate::assembler::parse_response;
use crate::cli::{OutputFormat, write_json_line};
use crate::codec::decode_event;

use super::ui::{EventView, Painter, RecordView};

/// Raw frame bytes given on the command line as hex.
///
/// Whitespace and an optional `0x` prefix are ignored.
#[derive(Debug, Clone)]
pub(crate) struct HexFrame(Vec<u8>);

impl FromStr for HexFrame {
    type Err = hex::FromHexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits: String = trimmed
            .strip_prefix("0x")
            .unwrap_or(trimmed)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        hex::decode(digits).map(Self)
    }
}

/// Arguments for the offline decode commands.
#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Frame bytes as hex, e.g. `0002040101000000`.
    frame: HexFrame,
}

impl DecodeArgs {
    /// Creates decode arguments from a hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if `frame` is not valid hex.
    pub fn new(frame: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self {
            frame: frame.parse()?,
        })
    }

    fn bytes(&self) -> &[u8] {
        &self.frame.0
    }
}

/// Executes `decode-event`.
#[instrument(skip(args, out, painter), level = "debug", fields(frame_len = args.bytes().len()))]
pub(crate) fn run_event<W>(
    args: &DecodeArgs,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let event = decode_event(args.bytes())?;
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", EventView::new(&event, painter))?,
        OutputFormat::Json => write_json_line(out, &event)?,
    }
    Ok(())
}

/// Executes `decode-response`.
#[instrument(skip(args, out, painter), level = "debug", fields(frame_len = args.bytes().len()))]
pub(crate) fn run_response<W>(
    args: &DecodeArgs,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let record = parse_response(args.bytes())?;
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", RecordView::new(&record, painter))?,
        OutputFormat::Json => write_json_line(out, &record)?,
    }
    Ok(())
}
