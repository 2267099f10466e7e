//! The closed set of S101 commands and their per-packet header fields.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ParseCommandError, ProtocolViolation, Result, UsageError};

/// Negotiated S101 protocol version. The only version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Maximum application bytes carried in one EmberData packet header.
pub const MAX_APP_BYTES: usize = 255;

/// The command-type byte. Closed, non-extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    EmberData = 0x00,
    KeepAliveRequest = 0x01,
    KeepAliveResponse = 0x02,
}

impl CommandType {
    /// Map a wire byte onto a command type.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::EmberData),
            0x01 => Some(Self::KeepAliveRequest),
            0x02 => Some(Self::KeepAliveResponse),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Name used by the textual command form.
    pub fn name(self) -> &'static str {
        match self {
            Self::EmberData => "EmberData",
            Self::KeepAliveRequest => "KeepAliveRequest",
            Self::KeepAliveResponse => "KeepAliveResponse",
        }
    }
}

/// Per-packet position markers within a (possibly multi-packet) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// Mid-sequence packet.
    pub const NONE: Self = Self(0x00);
    /// First packet of a message.
    pub const FIRST_PACKET: Self = Self(0x80);
    /// Last packet of a message.
    pub const LAST_PACKET: Self = Self(0x40);
    /// Packet carrying no payload bytes.
    pub const EMPTY_PACKET: Self = Self(0x20);
    /// A message that fits in one packet.
    pub const SINGLE_PACKET: Self = Self(0x80 | 0x40);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One S101 command. Equality is defined by command type alone; payload
/// identity travels out-of-band.
#[derive(Debug, Clone)]
pub enum Command {
    /// Carries an opaque Ember payload, possibly split over many packets.
    EmberData { dtd: u8, app_bytes: Vec<u8> },
    KeepAliveRequest,
    KeepAliveResponse,
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.command_type() == other.command_type()
    }
}

impl Eq for Command {}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::EmberData { .. } => CommandType::EmberData,
            Self::KeepAliveRequest => CommandType::KeepAliveRequest,
            Self::KeepAliveResponse => CommandType::KeepAliveResponse,
        }
    }

    /// Whether this command opens a payload stream.
    pub fn can_have_payload(&self) -> bool {
        match self {
            Self::EmberData { .. } => true,
            Self::KeepAliveRequest | Self::KeepAliveResponse => false,
        }
    }

    /// Whether one logical message may span several physical packets.
    pub fn can_have_multiple_packets(&self) -> bool {
        match self {
            Self::EmberData { .. } => true,
            Self::KeepAliveRequest | Self::KeepAliveResponse => false,
        }
    }

    /// Whether two commands carry identical header fields. Stricter than
    /// `PartialEq`, which compares command type only: every continuation
    /// packet must repeat the first packet's fields byte for byte.
    pub(crate) fn header_fields_match(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::EmberData { dtd, app_bytes },
                Self::EmberData {
                    dtd: other_dtd,
                    app_bytes: other_app,
                },
            ) => dtd == other_dtd && app_bytes == other_app,
            (Self::KeepAliveRequest, Self::KeepAliveRequest) => true,
            (Self::KeepAliveResponse, Self::KeepAliveResponse) => true,
            _ => false,
        }
    }

    /// Append the command-type byte, version byte, and variant fields.
    pub(crate) fn encode(&self, flags: PacketFlags, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.command_type().byte());
        dst.put_u8(PROTOCOL_VERSION);
        match self {
            Self::EmberData { dtd, app_bytes } => {
                if app_bytes.len() > MAX_APP_BYTES {
                    return Err(UsageError::ApplicationBytesTooLong {
                        len: app_bytes.len(),
                    }
                    .into());
                }
                dst.put_u8(flags.bits());
                dst.put_u8(*dtd);
                dst.put_u8(app_bytes.len() as u8);
                dst.put_slice(app_bytes);
            }
            Self::KeepAliveRequest | Self::KeepAliveResponse => {}
        }
        Ok(())
    }

    /// Decode the command-type byte, version byte, and variant fields from
    /// packet content. Bytes remaining in `src` afterwards are the packet's
    /// payload chunk.
    pub(crate) fn decode(src: &mut BytesMut) -> Result<(Self, PacketFlags)> {
        need(src, 2)?;
        let type_byte = src.get_u8();
        let command_type = CommandType::from_byte(type_byte)
            .ok_or(ProtocolViolation::UnknownCommandType { found: type_byte })?;
        let version = src.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolViolation::UnsupportedVersion { found: version }.into());
        }
        match command_type {
            CommandType::EmberData => {
                need(src, 3)?;
                let flags = PacketFlags::from_bits(src.get_u8());
                let dtd = src.get_u8();
                let app_len = usize::from(src.get_u8());
                need(src, app_len)?;
                let app_bytes = src.split_to(app_len).to_vec();
                Ok((Self::EmberData { dtd, app_bytes }, flags))
            }
            CommandType::KeepAliveRequest => {
                Ok((Self::KeepAliveRequest, PacketFlags::SINGLE_PACKET))
            }
            CommandType::KeepAliveResponse => {
                Ok((Self::KeepAliveResponse, PacketFlags::SINGLE_PACKET))
            }
        }
    }
}

fn need(src: &BytesMut, n: usize) -> Result<()> {
    if src.len() < n {
        return Err(ProtocolViolation::PacketTooShort { len: src.len() }.into());
    }
    Ok(())
}

/// Textual form used by log fixtures: the command-type name followed by
/// variant fields in two-digit hex.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_type().name())?;
        if let Self::EmberData { dtd, app_bytes } = self {
            write!(f, " {dtd:02X}")?;
            for byte in app_bytes {
                write!(f, " {byte:02X}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let mut tokens = text.split_whitespace();
        let name = tokens.next().ok_or(ParseCommandError::Empty)?;
        match name {
            "EmberData" => {
                let dtd = tokens.next().ok_or(ParseCommandError::MissingDtd)?;
                let dtd = parse_hex_field(dtd)?;
                let app_bytes = tokens
                    .map(parse_hex_field)
                    .collect::<std::result::Result<Vec<u8>, _>>()?;
                Ok(Self::EmberData { dtd, app_bytes })
            }
            "KeepAliveRequest" => {
                if tokens.next().is_some() {
                    return Err(ParseCommandError::UnexpectedFields("KeepAliveRequest"));
                }
                Ok(Self::KeepAliveRequest)
            }
            "KeepAliveResponse" => {
                if tokens.next().is_some() {
                    return Err(ParseCommandError::UnexpectedFields("KeepAliveResponse"));
                }
                Ok(Self::KeepAliveResponse)
            }
            other => Err(ParseCommandError::UnknownName(other.to_string())),
        }
    }
}

fn parse_hex_field(token: &str) -> std::result::Result<u8, ParseCommandError> {
    u8::from_str_radix(token, 16).map_err(|_| ParseCommandError::InvalidField(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::S101Error;

    #[test]
    fn equality_is_by_command_type() {
        let a = Command::EmberData {
            dtd: 0x01,
            app_bytes: vec![0x0A],
        };
        let b = Command::EmberData {
            dtd: 0x07,
            app_bytes: vec![],
        };
        assert_eq!(a, b);
        assert_ne!(a, Command::KeepAliveRequest);
        assert_ne!(Command::KeepAliveRequest, Command::KeepAliveResponse);
    }

    #[test]
    fn header_field_match_is_stricter_than_equality() {
        let a = Command::EmberData {
            dtd: 0x01,
            app_bytes: vec![0x0A],
        };
        let b = Command::EmberData {
            dtd: 0x7F,
            app_bytes: vec![0x0B],
        };
        assert_eq!(a, b);
        assert!(!a.header_fields_match(&b));
        assert!(a.header_fields_match(&a.clone()));
        assert!(Command::KeepAliveRequest.header_fields_match(&Command::KeepAliveRequest));
        assert!(!Command::KeepAliveRequest.header_fields_match(&Command::KeepAliveResponse));
    }

    #[test]
    fn capabilities_per_variant() {
        let data = Command::EmberData {
            dtd: 0x01,
            app_bytes: vec![],
        };
        assert!(data.can_have_payload());
        assert!(data.can_have_multiple_packets());
        assert!(!Command::KeepAliveRequest.can_have_payload());
        assert!(!Command::KeepAliveResponse.can_have_multiple_packets());
    }

    #[test]
    fn ember_data_header_roundtrip() {
        let command = Command::EmberData {
            dtd: 0x01,
            app_bytes: vec![0x0A, 0x02],
        };
        let mut buf = BytesMut::new();
        command
            .encode(PacketFlags::FIRST_PACKET, &mut buf)
            .unwrap();
        assert_eq!(buf.as_ref(), &[0x00, 0x01, 0x80, 0x01, 0x02, 0x0A, 0x02]);

        let (decoded, flags) = Command::decode(&mut buf).unwrap();
        assert_eq!(decoded.command_type(), CommandType::EmberData);
        assert_eq!(flags, PacketFlags::FIRST_PACKET);
        match decoded {
            Command::EmberData { dtd, app_bytes } => {
                assert_eq!(dtd, 0x01);
                assert_eq!(app_bytes, vec![0x0A, 0x02]);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn keep_alive_encodes_without_variant_fields() {
        let mut buf = BytesMut::new();
        Command::KeepAliveRequest
            .encode(PacketFlags::NONE, &mut buf)
            .unwrap();
        assert_eq!(buf.as_ref(), &[0x01, 0x01]);
    }

    #[test]
    fn unknown_command_type_is_rejected() {
        let mut buf = BytesMut::from(&[0x7F, 0x01][..]);
        let err = Command::decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::UnknownCommandType { found: 0x7F })
        ));
    }

    #[test]
    fn unexpected_version_is_rejected() {
        let mut buf = BytesMut::from(&[0x01, 0x02][..]);
        let err = Command::decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::UnsupportedVersion { found: 0x02 })
        ));
    }

    #[test]
    fn short_ember_data_header_is_rejected() {
        let mut buf = BytesMut::from(&[0x00, 0x01, 0x80, 0x01, 0x05, 0xAA][..]);
        let err = Command::decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::PacketTooShort { .. })
        ));
    }

    #[test]
    fn oversized_app_bytes_are_a_usage_error() {
        let command = Command::EmberData {
            dtd: 0x01,
            app_bytes: vec![0u8; 256],
        };
        let mut buf = BytesMut::new();
        let err = command.encode(PacketFlags::NONE, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Usage(UsageError::ApplicationBytesTooLong { len: 256 })
        ));
    }

    #[test]
    fn packet_flag_combinations() {
        let single = PacketFlags::FIRST_PACKET | PacketFlags::LAST_PACKET;
        assert_eq!(single, PacketFlags::SINGLE_PACKET);
        assert!(single.contains(PacketFlags::FIRST_PACKET));
        assert!(single.contains(PacketFlags::LAST_PACKET));
        assert!(!single.contains(PacketFlags::EMPTY_PACKET));
        assert_eq!(
            (PacketFlags::LAST_PACKET | PacketFlags::EMPTY_PACKET).bits(),
            0x60
        );
    }

    #[test]
    fn textual_form_roundtrips() {
        let commands = [
            Command::EmberData {
                dtd: 0x01,
                app_bytes: vec![0x0A, 0x02],
            },
            Command::EmberData {
                dtd: 0xF8,
                app_bytes: vec![],
            },
            Command::KeepAliveRequest,
            Command::KeepAliveResponse,
        ];
        for command in commands {
            let text = command.to_string();
            let parsed: Command = text.parse().unwrap();
            assert_eq!(parsed.command_type(), command.command_type());
            if let (
                Command::EmberData { dtd, app_bytes },
                Command::EmberData {
                    dtd: parsed_dtd,
                    app_bytes: parsed_app,
                },
            ) = (&command, &parsed)
            {
                assert_eq!(dtd, parsed_dtd);
                assert_eq!(app_bytes, parsed_app);
            }
        }
    }

    #[test]
    fn textual_form_examples() {
        let command = Command::EmberData {
            dtd: 0x01,
            app_bytes: vec![0x0A, 0x02],
        };
        assert_eq!(command.to_string(), "EmberData 01 0A 02");
        assert_eq!(Command::KeepAliveRequest.to_string(), "KeepAliveRequest");
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert_eq!("".parse::<Command>(), Err(ParseCommandError::Empty));
        assert_eq!(
            "Bogus".parse::<Command>(),
            Err(ParseCommandError::UnknownName("Bogus".to_string()))
        );
        assert_eq!(
            "EmberData".parse::<Command>(),
            Err(ParseCommandError::MissingDtd)
        );
        assert_eq!(
            "EmberData zz".parse::<Command>(),
            Err(ParseCommandError::InvalidField("zz".to_string()))
        );
        assert_eq!(
            "KeepAliveRequest 01".parse::<Command>(),
            Err(ParseCommandError::UnexpectedFields("KeepAliveRequest"))
        );
    }
}
