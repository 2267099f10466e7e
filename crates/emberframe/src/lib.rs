//! Ember+ S101 framing with log conversion tooling.
//!
//! emberframe frames opaque Ember payloads for transport over any
//! byte-oriented channel: frame delimiters, byte stuffing, a per-packet
//! CRC trailer, and multi-packet payload reassembly.
//!
//! # Crate Structure
//!
//! - [`s101`]: the framing layer with buffers, frame codec, command model,
//!   writer, and reader
//! - The `emberframe` binary (behind the `cli` feature) converts between
//!   wire hex dumps and the textual command log form

/// Re-export the S101 framing types.
pub mod s101 {
    pub use emberframe_s101::*;
}
