//! Frame-level codec: byte stuffing and the packet CRC.
//!
//! One physical packet on the wire:
//!
//! ```text
//! ┌──────┬───────────────────────────────────────────┬──────┐
//! │ 0xFE │ escaped(content ‖ crcLo ‖ crcHi)          │ 0xFF │
//! └──────┴───────────────────────────────────────────┴──────┘
//! ```
//!
//! Every content byte with value >= 0xF8 (including the CRC bytes) is
//! replaced by 0xFD followed by the byte XORed with 0x20, so the frame
//! delimiters can never occur inside a frame.

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{ProtocolViolation, Result};

/// Begin-of-frame delimiter.
pub const BOF: u8 = 0xFE;
/// End-of-frame delimiter.
pub const EOF: u8 = 0xFF;
/// Escape byte.
pub const ESCAPE: u8 = 0xFD;
/// XOR applied to an escaped byte on the wire.
pub const ESCAPE_XOR: u8 = 0x20;
/// Any raw byte at or above this value must be escaped.
pub const INVALID_START: u8 = 0xF8;

/// Default unescaped content budget per physical packet.
pub const DEFAULT_PACKET_SIZE: usize = 1024;

/// Smallest usable packet size: the largest possible packet header
/// (EmberData with 255 application bytes) plus one payload byte.
pub const MIN_PACKET_SIZE: usize = 263;

/// Default bound on unescaped content accepted per incoming packet.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 64 * 1024;

/// Returns true if `byte` must be escaped on the wire.
pub fn needs_escape(byte: u8) -> bool {
    byte >= INVALID_START
}

/// Incremental CRC-16/X.25: reflected polynomial 0x8408, seed 0xFFFF,
/// final complement. Transmitted low byte first.
#[derive(Debug, Clone, Copy)]
pub struct Crc16(u16);

const CRC_TABLE: [u16; 256] = build_crc_table();

const fn build_crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0x8408
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

impl Crc16 {
    pub fn new() -> Self {
        Self(0xFFFF)
    }

    pub fn update(&mut self, byte: u8) {
        self.0 = (self.0 >> 8) ^ CRC_TABLE[usize::from((self.0 as u8) ^ byte)];
    }

    pub fn finish(self) -> u16 {
        !self.0
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-16/X.25 over a complete slice.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    for &byte in bytes {
        crc.update(byte);
    }
    crc.finish()
}

/// Frame one packet's unescaped content and write it through the buffer.
///
/// Appends the CRC and applies the escape rule to content and CRC alike.
/// Does not flush.
pub(crate) fn write_packet<W: Write>(out: &mut WriteBuffer<W>, content: &[u8]) -> Result<()> {
    out.put_u8(BOF)?;
    let mut crc = Crc16::new();
    for &byte in content {
        crc.update(byte);
        put_escaped(out, byte)?;
    }
    let crc = crc.finish();
    put_escaped(out, (crc & 0xFF) as u8)?;
    put_escaped(out, (crc >> 8) as u8)?;
    out.put_u8(EOF)?;
    trace!(content_len = content.len(), crc, "packet framed");
    Ok(())
}

fn put_escaped<W: Write>(out: &mut WriteBuffer<W>, byte: u8) -> Result<()> {
    if needs_escape(byte) {
        out.put_u8(ESCAPE)?;
        out.put_u8(byte ^ ESCAPE_XOR)
    } else {
        out.put_u8(byte)
    }
}

/// Frame one packet into a standalone byte vector.
///
/// Convenience form of [`write_packet`] for fixtures and tooling.
pub fn encode_packet(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 8);
    out.push(BOF);
    let mut crc = Crc16::new();
    for &byte in content {
        crc.update(byte);
        push_escaped(&mut out, byte);
    }
    let crc = crc.finish();
    push_escaped(&mut out, (crc & 0xFF) as u8);
    push_escaped(&mut out, (crc >> 8) as u8);
    out.push(EOF);
    out
}

fn push_escaped(out: &mut Vec<u8>, byte: u8) {
    if needs_escape(byte) {
        out.push(ESCAPE);
        out.push(byte ^ ESCAPE_XOR);
    } else {
        out.push(byte);
    }
}

/// Read one packet and return its unescaped content, CRC verified and
/// stripped.
///
/// Bytes before begin-of-frame are skipped (out-of-frame noise on serial
/// lines). Returns `Ok(None)` on a clean end of stream before a frame
/// starts; an end of stream inside a frame is a protocol violation.
pub(crate) fn read_packet<R: Read>(
    input: &mut ReadBuffer<R>,
    max_content: usize,
) -> Result<Option<BytesMut>> {
    loop {
        if !input.fill(1)? {
            return Ok(None);
        }
        let byte = input.take_u8()?;
        if byte == BOF {
            break;
        }
        trace!(byte, "skipping out-of-frame byte");
    }

    let mut content = BytesMut::new();
    loop {
        if !input.fill(1)? {
            return Err(ProtocolViolation::TruncatedPacket.into());
        }
        match input.take_u8()? {
            EOF => break,
            BOF => return Err(ProtocolViolation::UnterminatedPacket.into()),
            ESCAPE => {
                if !input.fill(1)? {
                    return Err(ProtocolViolation::TruncatedPacket.into());
                }
                let next = input.take_u8()?;
                if next == EOF || next == BOF {
                    return Err(ProtocolViolation::DanglingEscape.into());
                }
                content.put_u8(next ^ ESCAPE_XOR);
            }
            byte => content.put_u8(byte),
        }
        if content.len() > max_content {
            return Err(ProtocolViolation::PacketTooLong {
                len: content.len(),
                max: max_content,
            }
            .into());
        }
    }

    // Minimum content: slot, message type, command type, version, CRC.
    if content.len() < 6 {
        return Err(ProtocolViolation::PacketTooShort {
            len: content.len(),
        }
        .into());
    }

    let crc_bytes = content.split_off(content.len() - 2);
    let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let computed = crc16(&content);
    if computed != received {
        return Err(ProtocolViolation::CrcMismatch { computed, received }.into());
    }
    Ok(Some(content))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::S101Error;

    fn read_one(wire: &[u8]) -> Result<Option<BytesMut>> {
        let mut input = ReadBuffer::new(Cursor::new(wire.to_vec()));
        read_packet(&mut input, DEFAULT_MAX_PACKET_SIZE)
    }

    #[test]
    fn crc_matches_reference_vectors() {
        assert_eq!(crc16(&[0x00, 0x0E, 0x01, 0x01]), 0xE494);
        assert_eq!(crc16(&[0x00, 0x0E, 0x02, 0x01]), 0xCEFC);
        assert_eq!(
            crc16(&[0x00, 0x0E, 0x00, 0x01, 0x80, 0x01, 0x02, 0x0A, 0x02]),
            0x78F5
        );
        assert_eq!(
            crc16(&[0x00, 0x0E, 0x00, 0x01, 0x60, 0x01, 0x02, 0x0A, 0x02]),
            0x5313
        );
    }

    #[test]
    fn keep_alive_request_frames_to_reference_bytes() {
        let wire = encode_packet(&[0x00, 0x0E, 0x01, 0x01]);
        assert_eq!(wire, vec![0xFE, 0x00, 0x0E, 0x01, 0x01, 0x94, 0xE4, 0xFF]);
    }

    #[test]
    fn crc_bytes_are_escaped() {
        // KeepAliveResponse content: the low CRC byte is 0xFC and must go
        // out as FD DC.
        let wire = encode_packet(&[0x00, 0x0E, 0x02, 0x01]);
        assert_eq!(
            wire,
            vec![0xFE, 0x00, 0x0E, 0x02, 0x01, 0xFD, 0xDC, 0xCE, 0xFF]
        );
    }

    #[test]
    fn escape_rule_covers_every_byte_value() {
        for byte in 0u8..=255 {
            let mut out = Vec::new();
            push_escaped(&mut out, byte);
            if byte >= INVALID_START {
                assert_eq!(out, vec![ESCAPE, byte ^ ESCAPE_XOR], "byte 0x{byte:02X}");
            } else {
                assert_eq!(out, vec![byte], "byte 0x{byte:02X}");
            }
        }
    }

    #[test]
    fn packet_roundtrip_with_all_byte_values() {
        let mut content = vec![0x00, 0x0E, 0x00, 0x01];
        content.extend(0u8..=255);
        let wire = encode_packet(&content);
        let decoded = read_one(&wire).unwrap().unwrap();
        assert_eq!(decoded.as_ref(), content.as_slice());
    }

    #[test]
    fn streamed_and_standalone_encodings_agree() {
        let content = [0x00, 0x0E, 0x00, 0x01, 0xF8, 0xFE, 0xFF, 0xFD];
        let mut out = WriteBuffer::new(Vec::new());
        write_packet(&mut out, &content).unwrap();
        out.flush().unwrap();
        assert_eq!(out.into_inner(), encode_packet(&content));
    }

    #[test]
    fn clean_end_of_stream_reads_as_no_packet() {
        assert!(read_one(&[]).unwrap().is_none());
    }

    #[test]
    fn noise_before_frame_is_skipped() {
        let mut wire = vec![0x00, 0x55, 0xAA];
        wire.extend(encode_packet(&[0x00, 0x0E, 0x01, 0x01]));
        let decoded = read_one(&wire).unwrap().unwrap();
        assert_eq!(decoded.as_ref(), &[0x00, 0x0E, 0x01, 0x01]);
    }

    #[test]
    fn truncation_inside_frame_is_a_protocol_error() {
        let mut wire = encode_packet(&[0x00, 0x0E, 0x01, 0x01]);
        wire.pop();
        let err = read_one(&wire).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::TruncatedPacket)
        ));
    }

    #[test]
    fn escape_before_eof_is_a_protocol_error() {
        let wire = [BOF, 0x00, 0x0E, 0x01, 0x01, 0x94, ESCAPE, EOF];
        let err = read_one(&wire).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::DanglingEscape)
        ));
    }

    #[test]
    fn corrupted_byte_fails_crc() {
        let mut wire = encode_packet(&[0x00, 0x0E, 0x01, 0x01]);
        wire[2] ^= 0x01;
        let err = read_one(&wire).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::CrcMismatch { .. })
        ));
    }

    #[test]
    fn undersized_packet_is_rejected() {
        let wire = encode_packet(&[0x00, 0x0E]);
        let err = read_one(&wire).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::PacketTooShort { .. })
        ));
    }

    #[test]
    fn oversized_packet_is_rejected() {
        let content = vec![0x11u8; 64];
        let wire = encode_packet(&content);
        let mut input = ReadBuffer::new(Cursor::new(wire));
        let err = read_packet(&mut input, 16).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::PacketTooLong { .. })
        ));
    }

    #[test]
    fn restarted_frame_is_rejected() {
        let wire = [BOF, 0x00, 0x0E, BOF];
        let err = read_one(&wire).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Protocol(ProtocolViolation::UnterminatedPacket)
        ));
    }
}
