use bytes::{Buf, BufMut, BytesMut};

use crate::command::{Command, PacketFlags};
use crate::error::{ProtocolViolation, Result};

/// The fixed message-type byte carried by every S101 message (the Ember tag).
pub const MESSAGE_TYPE_EMBER: u8 = 0x0E;

/// One logical S101 message: a transport slot plus exactly one command.
///
/// Equality follows [`Command`] equality: same slot and same command type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Transport-level routing channel.
    pub slot: u8,
    pub command: Command,
}

impl Message {
    pub fn new(slot: u8, command: Command) -> Self {
        Self { slot, command }
    }

    pub fn keep_alive_request(slot: u8) -> Self {
        Self::new(slot, Command::KeepAliveRequest)
    }

    pub fn keep_alive_response(slot: u8) -> Self {
        Self::new(slot, Command::KeepAliveResponse)
    }

    pub fn ember_data(slot: u8, dtd: u8, app_bytes: Vec<u8>) -> Self {
        Self::new(slot, Command::EmberData { dtd, app_bytes })
    }

    /// Whether `other` repeats this message's full packet header: same slot
    /// and identical command header fields, not just the same command type.
    pub(crate) fn header_matches(&self, other: &Self) -> bool {
        self.slot == other.slot && self.command.header_fields_match(&other.command)
    }

    /// Append one physical packet's header: slot, message type, command.
    pub(crate) fn encode_packet_header(
        &self,
        flags: PacketFlags,
        dst: &mut BytesMut,
    ) -> Result<()> {
        dst.put_u8(self.slot);
        dst.put_u8(MESSAGE_TYPE_EMBER);
        self.command.encode(flags, dst)
    }

    /// Decode a packet header from unescaped content. Bytes remaining in
    /// `src` afterwards are the packet's payload chunk.
    pub(crate) fn decode(src: &mut BytesMut) -> Result<(Self, PacketFlags)> {
        if src.len() < 2 {
            return Err(ProtocolViolation::PacketTooShort { len: src.len() }.into());
        }
        let slot = src.get_u8();
        let message_type = src.get_u8();
        if message_type != MESSAGE_TYPE_EMBER {
            return Err(ProtocolViolation::UnexpectedMessageType {
                found: message_type,
            }
            .into());
        }
        let (command, flags) = Command::decode(src)?;
        Ok((Self { slot, command }, flags))
    }
}
