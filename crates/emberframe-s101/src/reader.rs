use std::io::Read;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::buffer::ReadBuffer;
use crate::command::PacketFlags;
use crate::error::{ProtocolViolation, Result, UsageError};
use crate::flight::Flight;
use crate::frame::{read_packet, DEFAULT_MAX_PACKET_SIZE};
use crate::message::Message;

/// Reconstructs S101 messages and their payload streams from framed packets
/// read through any `Read` primitive.
///
/// [`read_next`](Self::read_next) advances to the next message, draining any
/// unread payload of the previous one. The current message's payload is
/// consumed lazily with [`read_payload`](Self::read_payload); continuation
/// packets are fetched, unescaped, and CRC-checked on demand.
pub struct S101Reader<R: Read> {
    input: ReadBuffer<R>,
    flight: Flight,
    max_packet_size: usize,
    current: Option<CurrentMessage>,
}

struct CurrentMessage {
    message: Message,
    chunk: BytesMut,
    last_seen: bool,
}

impl<R: Read> S101Reader<R> {
    /// Create a reader with the default per-packet content bound.
    pub fn new(inner: R) -> Self {
        Self::with_packet_size(inner, DEFAULT_MAX_PACKET_SIZE)
    }

    /// Create a reader with an explicit bound on unescaped content accepted
    /// per incoming packet.
    pub fn with_packet_size(inner: R, max_packet_size: usize) -> Self {
        Self {
            input: ReadBuffer::new(inner),
            flight: Flight::new(),
            max_packet_size,
            current: None,
        }
    }

    /// Advance to the next message.
    ///
    /// Returns `false` when the transport is exhausted at a message
    /// boundary. Any unread payload of the previous message is drained
    /// first. On a protocol violation the reader becomes unusable until
    /// disposed.
    pub fn read_next(&mut self) -> Result<bool> {
        self.flight.begin()?;
        let result = self.read_next_inner();
        if let Err(err) = &result {
            warn!(error = %err, "message read failed; reader unusable until disposed");
            self.flight.poison();
        }
        result
    }

    fn read_next_inner(&mut self) -> Result<bool> {
        self.drain_current()?;

        let Some(mut content) = read_packet(&mut self.input, self.max_packet_size)? else {
            return Ok(false);
        };
        let (message, flags) = Message::decode(&mut content)?;

        if message.command.can_have_multiple_packets() {
            if !flags.contains(PacketFlags::FIRST_PACKET) {
                return Err(ProtocolViolation::FlagsOutOfSequence {
                    found: flags.bits(),
                }
                .into());
            }
        } else {
            // Single-packet commands never expose a payload.
            content.clear();
        }

        let last_seen = !message.command.can_have_multiple_packets()
            || flags.contains(PacketFlags::LAST_PACKET);
        debug!(slot = message.slot, command = %message.command, "message decoded");
        self.current = Some(CurrentMessage {
            message,
            chunk: content,
            last_seen,
        });
        Ok(true)
    }

    /// The message produced by the last successful [`read_next`](Self::read_next).
    pub fn message(&self) -> Option<&Message> {
        self.current.as_ref().map(|current| &current.message)
    }

    /// Read payload bytes of the current message into `buf`.
    ///
    /// Returns `Ok(0)` once the payload is exhausted. Reading past the
    /// current packet transparently fetches and verifies the next one.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.flight.begin()?;
        let result = self.read_payload_inner(buf);
        if let Err(err) = &result {
            warn!(error = %err, "payload read failed; reader unusable until disposed");
            self.flight.poison();
        }
        result
    }

    fn read_payload_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(current) = &mut self.current else {
                return Err(UsageError::NoCurrentMessage.into());
            };
            if !current.chunk.is_empty() {
                let take = buf.len().min(current.chunk.len());
                buf[..take].copy_from_slice(&current.chunk[..take]);
                current.chunk.advance(take);
                return Ok(take);
            }
            if current.last_seen {
                return Ok(0);
            }
            self.next_packet()?;
        }
    }

    /// Collect the rest of the current message's payload.
    pub fn payload_to_end(&mut self) -> Result<Bytes> {
        self.flight.begin()?;
        let result = self.payload_to_end_inner();
        if let Err(err) = &result {
            warn!(error = %err, "payload read failed; reader unusable until disposed");
            self.flight.poison();
        }
        result
    }

    fn payload_to_end_inner(&mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        loop {
            let Some(current) = &mut self.current else {
                return Err(UsageError::NoCurrentMessage.into());
            };
            out.extend_from_slice(&current.chunk);
            current.chunk.clear();
            if current.last_seen {
                return Ok(out.freeze());
            }
            self.next_packet()?;
        }
    }

    /// True when the current message is fully consumed and bytes of a
    /// further message are already buffered, so the next
    /// [`read_next`](Self::read_next) can complete without touching the
    /// transport.
    pub fn message_available(&self) -> bool {
        let current_consumed = match &self.current {
            None => true,
            Some(current) => current.last_seen && current.chunk.is_empty(),
        };
        current_consumed && self.input.unread() > 0
    }

    /// Release the reader. Idempotent, never fails.
    pub fn dispose(&mut self) {
        if self.flight.dispose() {
            self.current = None;
        }
    }

    /// Borrow the underlying primitive.
    pub fn get_ref(&self) -> &R {
        self.input.get_ref()
    }

    /// Consume the reader and return the inner primitive. Buffered bytes are
    /// discarded.
    pub fn into_inner(self) -> R {
        self.input.into_inner()
    }

    /// Fetch the next physical packet of the message in progress.
    fn next_packet(&mut self) -> Result<()> {
        let Some(mut content) = read_packet(&mut self.input, self.max_packet_size)? else {
            return Err(ProtocolViolation::TruncatedMessage.into());
        };
        let (message, flags) = Message::decode(&mut content)?;
        let Some(current) = &mut self.current else {
            return Err(UsageError::NoCurrentMessage.into());
        };
        if !current.message.header_matches(&message) {
            return Err(ProtocolViolation::HeaderMismatch.into());
        }
        if flags.contains(PacketFlags::FIRST_PACKET) {
            return Err(ProtocolViolation::FlagsOutOfSequence {
                found: flags.bits(),
            }
            .into());
        }
        current.last_seen = flags.contains(PacketFlags::LAST_PACKET);
        trace!(
            slot = message.slot,
            chunk_len = content.len(),
            last = current.last_seen,
            "continuation packet"
        );
        current.chunk = content;
        Ok(())
    }

    /// Discard the rest of the current message so the next one can begin.
    fn drain_current(&mut self) -> Result<()> {
        loop {
            match &mut self.current {
                None => return Ok(()),
                Some(current) if current.last_seen => {
                    self.current = None;
                    return Ok(());
                }
                Some(current) => {
                    current.chunk.clear();
                }
            }
            self.next_packet()?;
        }
    }
}
