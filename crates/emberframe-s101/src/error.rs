use std::io;

/// Errors surfaced by the S101 framing layer.
///
/// The three variants map directly onto the failure classes callers must
/// distinguish: a misbehaving peer, a misbehaving caller, and a failing
/// transport.
#[derive(Debug, thiserror::Error)]
pub enum S101Error {
    /// The byte stream violated the S101 framing protocol. The instance that
    /// observed the violation is unusable until disposed.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The API was misused. Indicates a programming error, not a transport
    /// or peer failure.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// An I/O error reported by the injected read/write primitive,
    /// propagated unmodified.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Violations of the S101 wire protocol by the remote peer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    /// The message-type byte was not the Ember tag (0x0E).
    #[error("unexpected message type 0x{found:02X} (expected 0x0E)")]
    UnexpectedMessageType { found: u8 },

    /// The version byte did not match the negotiated constant (0x01).
    #[error("unsupported protocol version 0x{found:02X} (expected 0x01)")]
    UnsupportedVersion { found: u8 },

    /// The command-type byte named no known command.
    #[error("unknown command type 0x{found:02X}")]
    UnknownCommandType { found: u8 },

    /// The CRC computed over the decoded content disagrees with the
    /// transmitted CRC.
    #[error("CRC mismatch (computed 0x{computed:04X}, received 0x{received:04X})")]
    CrcMismatch { computed: u16, received: u16 },

    /// An escape byte was followed by a frame delimiter instead of an
    /// escaped content byte.
    #[error("escape byte not followed by an escapable byte")]
    DanglingEscape,

    /// A new frame started before the previous one was terminated.
    #[error("frame restarted before end-of-frame")]
    UnterminatedPacket,

    /// The packet content is shorter than the fixed header plus CRC.
    #[error("packet too short ({len} content bytes)")]
    PacketTooShort { len: usize },

    /// The unescaped packet content exceeds the configured bound.
    #[error("packet too long ({len} content bytes, max {max})")]
    PacketTooLong { len: usize, max: usize },

    /// Packet flags broke the first/none*/last sequencing of a message.
    #[error("packet flags 0x{found:02X} out of sequence")]
    FlagsOutOfSequence { found: u8 },

    /// A continuation packet's header does not match the message in
    /// progress.
    #[error("continuation packet header does not match the message in progress")]
    HeaderMismatch,

    /// The stream ended between begin-of-frame and end-of-frame.
    #[error("stream ended mid-packet")]
    TruncatedPacket,

    /// The stream ended before the current message's last packet.
    #[error("stream ended before the message's last packet")]
    TruncatedMessage,
}

/// API misuse detected at runtime.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    /// A new message was started while the previous payload sink was still
    /// open (or was dropped without being closed).
    #[error("previous payload sink has not been closed")]
    PayloadSinkOpen,

    /// A payload operation was invoked with no payload open.
    #[error("no payload is open")]
    NoOpenPayload,

    /// The instance failed mid-operation and must be disposed before its
    /// resources can be reused.
    #[error("instance is unusable after a failed operation; dispose it")]
    Poisoned,

    /// The instance has been disposed.
    #[error("instance has been disposed")]
    Disposed,

    /// A payload read was attempted before any message was decoded.
    #[error("no message is currently being read")]
    NoCurrentMessage,

    /// A buffer index was read past the filled region; call `fill` first.
    #[error("buffer read past the filled region")]
    BufferUnderflow,

    /// EmberData application bytes exceed the one-byte length field.
    #[error("application bytes exceed 255 bytes ({len})")]
    ApplicationBytesTooLong { len: usize },

    /// The configured packet size cannot hold a maximal packet header.
    #[error("packet size {size} below minimum {min}")]
    PacketSizeTooSmall { size: usize, min: usize },
}

/// Errors produced when parsing the textual command form.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command text")]
    Empty,

    #[error("unknown command name {0:?}")]
    UnknownName(String),

    #[error("invalid hex field {0:?}")]
    InvalidField(String),

    #[error("EmberData requires a dtd field")]
    MissingDtd,

    #[error("{0} takes no fields")]
    UnexpectedFields(&'static str),
}

pub type Result<T> = std::result::Result<T, S101Error>;
