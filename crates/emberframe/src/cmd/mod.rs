use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode framed S101 wire bytes into the textual log form.
    Decode(DecodeArgs),
    /// Frame a textual command (plus optional payload) into wire bytes.
    Encode(EncodeArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File containing a hex dump of wire bytes; reads stdin when omitted.
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Textual command form, e.g. "EmberData 01 0A 02" or "KeepAliveRequest".
    pub command: String,
    /// Slot to address, in hex.
    #[arg(long, default_value = "00")]
    pub slot: String,
    /// Payload bytes as hex (EmberData only).
    #[arg(long)]
    pub payload_hex: Option<String>,
    /// Unescaped content budget per physical packet.
    #[arg(long)]
    pub packet_size: Option<usize>,
}
