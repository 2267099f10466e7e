use std::io::IsTerminal;

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// One decoded message, ready for printing.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MessageRecord {
    pub slot: u8,
    pub command: String,
    pub payload_len: usize,
    pub payload: String,
}

pub fn print_message(record: &MessageRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            if record.payload.is_empty() {
                println!(
                    "slot={:02X} command=\"{}\" payload_len={}",
                    record.slot, record.command, record.payload_len
                );
            } else {
                println!(
                    "slot={:02X} command=\"{}\" payload_len={} payload={}",
                    record.slot, record.command, record.payload_len, record.payload
                );
            }
        }
    }
}

/// Render bytes as an uppercase hex dump, 16 bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(if i % 16 == 0 { '\n' } else { ' ' });
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}
