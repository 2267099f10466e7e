//! S101 message framing for Ember+ control data.
//!
//! S101 transports opaque Ember payloads over any byte-oriented channel:
//! a TCP socket, a serial line, or anything implementing `Read`/`Write`.
//! Every message is framed with:
//! - Begin/end-of-frame delimiters (0xFE / 0xFF)
//! - A byte-stuffing escape for values >= 0xF8
//! - A CRC-16/X.25 trailer per physical packet
//! - Packet flags for multi-packet payload reassembly
//!
//! No partial reads, no buffer management in user code.

pub mod buffer;
pub mod command;
pub mod error;
mod flight;
pub mod frame;
pub mod message;
pub mod reader;
pub mod writer;

pub use buffer::{ReadBuffer, WriteBuffer, DEFAULT_BUFFER_CAPACITY};
pub use command::{Command, CommandType, PacketFlags, MAX_APP_BYTES, PROTOCOL_VERSION};
pub use error::{ParseCommandError, ProtocolViolation, Result, S101Error, UsageError};
pub use frame::{
    crc16, encode_packet, needs_escape, Crc16, BOF, DEFAULT_MAX_PACKET_SIZE,
    DEFAULT_PACKET_SIZE, EOF, ESCAPE, ESCAPE_XOR, INVALID_START, MIN_PACKET_SIZE,
};
pub use message::{Message, MESSAGE_TYPE_EMBER};
pub use reader::S101Reader;
pub use writer::{PayloadSink, S101Writer};
