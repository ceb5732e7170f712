//! Protocol module - wire format, checksum, timestamps and packets.
//!
//! This module implements the port agent packet codec:
//! - 16-byte header encoding/decoding
//! - Pluggable LRC checksum strategy
//! - Fixed-point timestamps
//! - Packet struct with typed accessors

pub mod checksum;
mod packet;
mod timestamp;
mod wire_format;

pub use packet::{
    compute_checksum, decode_packet, encode, verify, AgentStatus, Packet, PacketRecord,
};
pub use timestamp::Timestamp;
pub use wire_format::{
    decode_header, Header, PacketType, CHECKSUM_RANGE, HEADER_SIZE, MAX_PACKET_SIZE,
    MAX_PAYLOAD_SIZE, SYNC,
};
