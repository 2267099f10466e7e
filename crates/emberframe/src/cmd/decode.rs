use std::fs;
use std::io::{Cursor, Read};

use emberframe_s101::S101Reader;
use tracing::debug;

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, s101_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{hex_dump, print_message, MessageRecord, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match &args.input {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|err| io_error("failed reading stdin", err))?;
            text
        }
    };
    let wire = parse_hex(&text)?;

    let mut reader = S101Reader::new(Cursor::new(wire));
    let mut decoded = 0usize;
    loop {
        match reader.read_next() {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => return Err(s101_error("decode failed", err)),
        }
        let message = match reader.message() {
            Some(message) => message.clone(),
            None => break,
        };
        let payload = reader
            .payload_to_end()
            .map_err(|err| s101_error("payload read failed", err))?;
        let record = MessageRecord {
            slot: message.slot,
            command: message.command.to_string(),
            payload_len: payload.len(),
            payload: hex_dump(&payload).replace('\n', " "),
        };
        print_message(&record, format);
        decoded += 1;
    }
    debug!(messages = decoded, "decode complete");
    Ok(SUCCESS)
}

/// Parse a whitespace-tolerant hex dump into bytes.
pub fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let mut digits = Vec::new();
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        let digit = c
            .to_digit(16)
            .ok_or_else(|| CliError::new(DATA_INVALID, format!("invalid hex digit {c:?}")))?;
        digits.push(digit as u8);
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("odd number of hex digits ({})", digits.len()),
        ));
    }
    Ok(digits.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect())
}
