//! Packet struct with typed accessors.
//!
//! A packet is built either for transmission (payload first, then a header
//! with a fresh timestamp and computed checksum) or on reception (header
//! decoded first, then the announced payload attached and verified).
//!
//! # Example
//!
//! ```
//! use port_agent_client::protocol::{decode_packet, encode, PacketType};
//!
//! let wire = encode(b"hello", PacketType::DataFromInstrument).unwrap();
//! let packet = decode_packet(&wire).unwrap();
//!
//! assert!(packet.is_valid());
//! assert_eq!(packet.packet_type().unwrap(), PacketType::DataFromInstrument);
//! assert_eq!(packet.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::checksum::lrc;
use super::timestamp::Timestamp;
use super::wire_format::{Header, PacketType, CHECKSUM_RANGE, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{PortAgentError, Result};

/// Compute the checksum of an encoded header and its payload.
///
/// The header's own checksum field is skipped.
pub fn compute_checksum(header: &[u8; HEADER_SIZE], payload: &[u8]) -> u16 {
    let sum = lrc(&header[..CHECKSUM_RANGE.start], 0);
    let sum = lrc(&header[CHECKSUM_RANGE.end..], sum);
    lrc(payload, sum) as u16
}

/// Verify a received header and payload.
///
/// Folding data together with its own correct checksum cancels to zero, so
/// the whole header (checksum field included) and payload must fold to zero.
pub fn verify(header: &[u8], payload: &[u8]) -> bool {
    lrc(payload, lrc(header, 0)) == 0
}

/// Encode a payload as a complete packet (header + payload).
pub fn encode(payload: &[u8], packet_type: PacketType) -> Result<Bytes> {
    Ok(Packet::outbound(packet_type, Bytes::copy_from_slice(payload))?.to_bytes())
}

/// Decode one complete packet from the start of `buf`.
pub fn decode_packet(buf: &[u8]) -> Result<Packet> {
    let header = Header::decode(buf)?;
    let end = header.total_length as usize;
    if buf.len() < end {
        return Err(PortAgentError::Protocol(format!(
            "Packet announces {} bytes, only {} available",
            end,
            buf.len()
        )));
    }
    Ok(Packet::from_wire(
        header,
        Bytes::copy_from_slice(&buf[HEADER_SIZE..end]),
    ))
}

/// Port agent connection state reported in `PORT_AGENT_STATUS` packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Connected,
    Disconnected,
    Other(String),
}

/// Serializable view of a packet, used when handing raw data downstream.
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    #[serde(rename = "type")]
    pub type_code: u8,
    pub length: usize,
    pub checksum: u16,
    pub timestamp: f64,
    pub raw: Vec<u8>,
}

/// A complete port agent packet.
#[derive(Debug, Clone)]
pub struct Packet {
    header: Header,
    payload: Bytes,
    valid: bool,
}

impl Packet {
    /// Build a packet for transmission stamped with the current time.
    pub fn outbound(packet_type: PacketType, payload: Bytes) -> Result<Self> {
        Self::outbound_at(packet_type, payload, Timestamp::now())
    }

    /// Build a packet for transmission with an explicit timestamp.
    pub fn outbound_at(packet_type: PacketType, payload: Bytes, timestamp: Timestamp) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PortAgentError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let mut header = Header::new(packet_type, payload.len(), timestamp)?;
        header.checksum = compute_checksum(&header.encode(), &payload);

        Ok(Self {
            header,
            payload,
            valid: true,
        })
    }

    /// Assemble a received packet and record whether its checksum holds.
    pub fn from_wire(header: Header, payload: Bytes) -> Self {
        let valid = verify(&header.encode(), &payload);
        Self {
            header,
            payload,
            valid,
        }
    }

    /// Encode header and payload into one buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Typed packet type; fails for codes outside the protocol.
    pub fn packet_type(&self) -> Result<PacketType> {
        self.header.packet_type()
    }

    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.header.type_code == PacketType::Heartbeat.code()
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.header.checksum
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.header.timestamp
    }

    /// Whether the checksum matched when the packet was assembled.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Interpret a `PORT_AGENT_STATUS` payload.
    pub fn agent_status(&self) -> Option<AgentStatus> {
        if self.header.type_code != PacketType::PortAgentStatus.code() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.payload);
        Some(match text.trim() {
            "CONNECTED" => AgentStatus::Connected,
            "DISCONNECTED" => AgentStatus::Disconnected,
            other => AgentStatus::Other(other.to_string()),
        })
    }

    /// Parse a `PORT_AGENT_CONFIG` payload as JSON.
    pub fn agent_config(&self) -> Option<Result<serde_json::Value>> {
        if self.header.type_code != PacketType::PortAgentConfig.code() {
            return None;
        }
        Some(serde_json::from_slice(&self.payload).map_err(PortAgentError::from))
    }

    pub fn to_record(&self) -> PacketRecord {
        PacketRecord {
            type_code: self.header.type_code,
            length: self.payload.len(),
            checksum: self.header.checksum,
            timestamp: self.header.timestamp.as_unix_secs(),
            raw: self.payload.to_vec(),
        }
    }
}
