use std::io::Write;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::buffer::WriteBuffer;
use crate::command::PacketFlags;
use crate::error::{Result, UsageError};
use crate::flight::Flight;
use crate::frame::{write_packet, DEFAULT_PACKET_SIZE, MIN_PACKET_SIZE};
use crate::message::Message;

/// Writes S101 messages as framed, escaped, CRC-terminated packets through
/// any `Write` primitive.
///
/// Commands without a payload are framed and flushed inside
/// [`write_message`](Self::write_message). Payload-capable commands return a
/// [`PayloadSink`] that segments the payload into physical packets at the
/// configured content budget. Exactly one sink may be open at a time; it must
/// be closed before the next message can begin.
#[derive(Debug)]
pub struct S101Writer<W: Write> {
    out: WriteBuffer<W>,
    flight: Flight,
    packet_size: usize,
    packet: BytesMut,
    pending: Option<Message>,
}

impl<W: Write> S101Writer<W> {
    /// Create a writer with the default per-packet content budget.
    pub fn new(inner: W) -> Self {
        Self {
            out: WriteBuffer::new(inner),
            flight: Flight::new(),
            packet_size: DEFAULT_PACKET_SIZE,
            packet: BytesMut::with_capacity(DEFAULT_PACKET_SIZE),
            pending: None,
        }
    }

    /// Create a writer with an explicit per-packet content budget
    /// (unescaped bytes, headers included).
    pub fn with_packet_size(inner: W, packet_size: usize) -> Result<Self> {
        if packet_size < MIN_PACKET_SIZE {
            return Err(UsageError::PacketSizeTooSmall {
                size: packet_size,
                min: MIN_PACKET_SIZE,
            }
            .into());
        }
        Ok(Self {
            out: WriteBuffer::new(inner),
            flight: Flight::new(),
            packet_size,
            packet: BytesMut::with_capacity(packet_size),
            pending: None,
        })
    }

    /// Begin transmission of one logical message.
    ///
    /// If the command cannot carry a payload the full frame is written and
    /// flushed before returning `None`. Otherwise the first packet's header
    /// is staged and the returned sink must receive the payload and be
    /// closed before the next message.
    pub fn write_message(&mut self, message: &Message) -> Result<Option<PayloadSink<'_, W>>> {
        self.flight.begin()?;

        if !message.command.can_have_payload() {
            self.packet.clear();
            let result = message
                .encode_packet_header(PacketFlags::NONE, &mut self.packet)
                .and_then(|()| write_packet(&mut self.out, &self.packet))
                .and_then(|()| self.out.flush());
            match &result {
                Err(err) => {
                    warn!(error = %err, "message write failed; writer unusable until disposed");
                    self.flight.poison();
                }
                Ok(()) => {
                    debug!(slot = message.slot, command = %message.command, "message written");
                }
            }
            return result.map(|()| None);
        }

        self.packet.clear();
        if let Err(err) = message.encode_packet_header(PacketFlags::FIRST_PACKET, &mut self.packet)
        {
            // Header encoding failed before anything reached the wire; the
            // writer stays usable.
            self.packet.clear();
            return Err(err);
        }
        self.pending = Some(message.clone());
        self.flight.open_payload();
        debug!(slot = message.slot, command = %message.command, "payload message started");
        Ok(Some(PayloadSink { writer: self }))
    }

    /// Frame and flush a keep-alive request on `slot`.
    pub fn write_keep_alive_request(&mut self, slot: u8) -> Result<()> {
        self.write_message(&Message::keep_alive_request(slot))
            .map(|_| ())
    }

    /// Frame and flush a keep-alive response on `slot`.
    pub fn write_keep_alive_response(&mut self, slot: u8) -> Result<()> {
        self.write_message(&Message::keep_alive_response(slot))
            .map(|_| ())
    }

    /// Release the writer. Pending complete packets are flushed best-effort;
    /// a partially assembled packet is discarded. Idempotent, never fails.
    pub fn dispose(&mut self) {
        if self.flight.dispose() {
            let _ = self.out.flush();
            self.pending = None;
            self.packet.clear();
        }
    }

    /// Per-packet content budget in unescaped bytes.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Borrow the underlying primitive.
    pub fn get_ref(&self) -> &W {
        self.out.get_ref()
    }

    /// Consume the writer and return the inner primitive.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn sink_write(&mut self, buf: &[u8]) -> Result<()> {
        self.flight.in_payload()?;
        let result = self.sink_write_inner(buf);
        if let Err(err) = &result {
            warn!(error = %err, "payload write failed; writer unusable until disposed");
            self.flight.poison();
        }
        result
    }

    fn sink_write_inner(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            if self.packet.len() >= self.packet_size {
                self.roll_packet()?;
            }
            let room = self.packet_size - self.packet.len();
            let take = room.min(buf.len());
            self.packet.extend_from_slice(&buf[..take]);
            buf = &buf[take..];
        }
        Ok(())
    }

    fn roll_packet(&mut self) -> Result<()> {
        write_packet(&mut self.out, &self.packet)?;
        trace!(content_len = self.packet.len(), "packet boundary reached");
        self.packet.clear();
        let Some(message) = &self.pending else {
            return Err(UsageError::NoOpenPayload.into());
        };
        message.encode_packet_header(PacketFlags::NONE, &mut self.packet)
    }

    fn sink_close(&mut self) -> Result<()> {
        self.flight.in_payload()?;
        let result = self.sink_close_inner();
        if let Err(err) = &result {
            warn!(error = %err, "payload close failed; writer unusable until disposed");
            self.flight.poison();
        } else {
            self.flight.close_payload();
        }
        result
    }

    fn sink_close_inner(&mut self) -> Result<()> {
        write_packet(&mut self.out, &self.packet)?;
        self.packet.clear();
        let Some(message) = self.pending.take() else {
            return Err(UsageError::NoOpenPayload.into());
        };
        message.encode_packet_header(
            PacketFlags::LAST_PACKET | PacketFlags::EMPTY_PACKET,
            &mut self.packet,
        )?;
        write_packet(&mut self.out, &self.packet)?;
        self.packet.clear();
        self.out.flush()?;
        debug!(slot = message.slot, "payload message finished");
        Ok(())
    }
}

/// Streams one message's payload, transparently splitting it into physical
/// packets at the writer's content budget.
///
/// Dropping the sink without calling [`close`](Self::close) leaves the
/// message unterminated; the writer then refuses further messages until it
/// is disposed.
pub struct PayloadSink<'a, W: Write> {
    writer: &'a mut S101Writer<W>,
}

impl<W: Write> PayloadSink<'_, W> {
    /// Append payload bytes, emitting completed packets as the budget fills.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.sink_write(buf)
    }

    /// Finalize the current packet and emit the terminating
    /// `LastPacket|EmptyPacket` frame. Mandatory before the next message.
    pub fn close(self) -> Result<()> {
        self.writer.sink_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::S101Error;
    use crate::frame::encode_packet;

    #[test]
    fn keep_alive_request_matches_reference_vector() {
        let mut writer = S101Writer::new(Vec::new());
        writer.write_keep_alive_request(0x00).unwrap();
        assert_eq!(
            writer.into_inner(),
            vec![0xFE, 0x00, 0x0E, 0x01, 0x01, 0x94, 0xE4, 0xFF]
        );
    }

    #[test]
    fn keep_alive_response_matches_reference_vector() {
        let mut writer = S101Writer::new(Vec::new());
        writer.write_keep_alive_response(0x00).unwrap();
        assert_eq!(
            writer.into_inner(),
            vec![0xFE, 0x00, 0x0E, 0x02, 0x01, 0xFD, 0xDC, 0xCE, 0xFF]
        );
    }

    #[test]
    fn empty_payload_produces_first_then_last_empty_packets() {
        let mut writer = S101Writer::new(Vec::new());
        let message = Message::ember_data(0x00, 0x01, vec![0x0A, 0x02]);
        let sink = writer.write_message(&message).unwrap().expect("sink");
        sink.close().unwrap();

        let mut expected =
            encode_packet(&[0x00, 0x0E, 0x00, 0x01, 0x80, 0x01, 0x02, 0x0A, 0x02]);
        expected.extend(encode_packet(&[
            0x00, 0x0E, 0x00, 0x01, 0x60, 0x01, 0x02, 0x0A, 0x02,
        ]));
        assert_eq!(
            expected,
            vec![
                0xFE, 0x00, 0x0E, 0x00, 0x01, 0x80, 0x01, 0x02, 0x0A, 0x02, 0xF5, 0x78, 0xFF,
                0xFE, 0x00, 0x0E, 0x00, 0x01, 0x60, 0x01, 0x02, 0x0A, 0x02, 0x13, 0x53, 0xFF,
            ]
        );
        assert_eq!(writer.into_inner(), expected);
    }

    #[test]
    fn payload_splits_at_the_packet_budget() {
        let mut writer = S101Writer::with_packet_size(Vec::new(), MIN_PACKET_SIZE).unwrap();
        let message = Message::ember_data(0x00, 0x01, vec![]);
        let mut sink = writer.write_message(&message).unwrap().expect("sink");
        // Header is 7 bytes; this payload cannot fit in one packet.
        sink.write(&vec![0xAB; MIN_PACKET_SIZE]).unwrap();
        sink.close().unwrap();

        let wire = writer.into_inner();
        let frames = wire.iter().filter(|&&b| b == 0xFE).count();
        assert_eq!(frames, 3, "first, continuation, and trailing empty packet");
    }

    #[test]
    fn unclosed_sink_blocks_the_next_message() {
        let mut writer = S101Writer::new(Vec::new());
        let message = Message::ember_data(0x00, 0x01, vec![]);
        let sink = writer.write_message(&message).unwrap();
        drop(sink);

        let err = writer.write_keep_alive_request(0x00).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Usage(UsageError::PayloadSinkOpen)
        ));
    }

    #[test]
    fn closed_sink_allows_the_next_message() {
        let mut writer = S101Writer::new(Vec::new());
        let message = Message::ember_data(0x00, 0x01, vec![]);
        let sink = writer.write_message(&message).unwrap().expect("sink");
        sink.close().unwrap();
        writer.write_keep_alive_request(0x00).unwrap();
    }

    #[test]
    fn disposed_writer_rejects_operations() {
        let mut writer = S101Writer::new(Vec::new());
        writer.dispose();
        writer.dispose(); // idempotent
        let err = writer.write_keep_alive_request(0x00).unwrap_err();
        assert!(matches!(err, S101Error::Usage(UsageError::Disposed)));
    }

    #[test]
    fn failed_write_poisons_the_writer() {
        struct FailingWriter;

        impl Write for FailingWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = S101Writer::new(FailingWriter);
        let err = writer.write_keep_alive_request(0x00).unwrap_err();
        assert!(matches!(err, S101Error::Io(_)));
        let err = writer.write_keep_alive_request(0x00).unwrap_err();
        assert!(matches!(err, S101Error::Usage(UsageError::Poisoned)));
    }

    #[test]
    fn undersized_packet_budget_is_rejected() {
        let err = S101Writer::with_packet_size(Vec::new(), 16).unwrap_err();
        assert!(matches!(
            err,
            S101Error::Usage(UsageError::PacketSizeTooSmall { size: 16, .. })
        ));
    }

    #[test]
    fn minimum_packet_budget_fits_a_maximal_header_and_one_byte() {
        // Largest header: 7 fixed bytes plus 255 application bytes.
        assert_eq!(MIN_PACKET_SIZE, 7 + 255 + 1);
        assert!(S101Writer::with_packet_size(Vec::new(), MIN_PACKET_SIZE).is_ok());
        assert!(S101Writer::with_packet_size(Vec::new(), MIN_PACKET_SIZE - 1).is_err());
    }
}
