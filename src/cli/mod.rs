pub(crate) mod command;
pub(crate) mod decode;
pub(crate) mod encode;
pub(crate) mod listen;
pub(crate) mod ui;

use std::io;

use serde::Serialize;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::decode::DecodeArgs;
pub use self::encode::EncodeCommand;
pub use self::listen::ListenArgs;

/// Writes one compact JSON object followed by a newline.
pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
