use emberframe_s101::{Command, Message, S101Writer};

use crate::cmd::decode::parse_hex;
use crate::cmd::EncodeArgs;
use crate::exit::{s101_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::hex_dump;

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let command: Command = args
        .command
        .parse()
        .map_err(|err| CliError::new(USAGE, format!("invalid command text: {err}")))?;
    let slot = u8::from_str_radix(args.slot.trim(), 16)
        .map_err(|_| CliError::new(USAGE, format!("invalid slot {:?}", args.slot)))?;
    let payload = match &args.payload_hex {
        Some(hex) => parse_hex(hex)?,
        None => Vec::new(),
    };
    if !payload.is_empty() && !command.can_have_payload() {
        return Err(CliError::new(
            USAGE,
            format!("{} cannot carry a payload", command.command_type().name()),
        ));
    }

    let wire = frame_message(&Message::new(slot, command), &payload, args.packet_size)?;
    println!("{}", hex_dump(&wire));
    Ok(SUCCESS)
}

fn frame_message(
    message: &Message,
    payload: &[u8],
    packet_size: Option<usize>,
) -> CliResult<Vec<u8>> {
    let mut writer = match packet_size {
        Some(size) => S101Writer::with_packet_size(Vec::new(), size)
            .map_err(|err| s101_error("invalid packet size", err))?,
        None => S101Writer::new(Vec::new()),
    };
    let sink = writer
        .write_message(message)
        .map_err(|err| s101_error("encode failed", err))?;
    if let Some(mut sink) = sink {
        sink.write(payload)
            .map_err(|err| s101_error("encode failed", err))?;
        sink.close()
            .map_err(|err| s101_error("encode failed", err))?;
    }
    Ok(writer.into_inner())
}
