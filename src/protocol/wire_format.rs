//! Wire format encoding and decoding.
//!
//! Implements the 16-byte port agent header:
//! ```text
//! ┌──────────┬──────┬──────────┬──────────┬──────────┬──────────┐
//! │ Sync     │ Type │ Length   │ Checksum │ TS secs  │ TS frac  │
//! │ 3 bytes  │ u8   │ u16 BE   │ u16 BE   │ u32 BE   │ u32 BE   │
//! └──────────┴──────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! `Length` counts the header itself, so the payload is `Length - 16` bytes.

use std::fmt;

use super::timestamp::Timestamp;
use crate::error::{PortAgentError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Sync bytes that open every packet.
pub const SYNC: [u8; 3] = [0xA3, 0x9D, 0x7A];

/// Largest total packet length the `u16` length field can carry.
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Largest payload that fits in a single packet.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

/// Byte range of the checksum field within the header.
pub const CHECKSUM_RANGE: std::ops::Range<usize> = 6..8;

/// Packet types carried in the header's type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    DataFromInstrument = 1,
    DataFromDriver = 2,
    PortAgentCommand = 3,
    PortAgentStatus = 4,
    PortAgentFault = 5,
    PortAgentConfig = 6,
    DigiCmd = 7,
    DigiRsp = 8,
    Heartbeat = 9,
    PickledFromInstrument = 10,
}

impl PacketType {
    /// Wire code of this type.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Upper-case protocol name, as the port agent logs it.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::DataFromInstrument => "DATA_FROM_INSTRUMENT",
            PacketType::DataFromDriver => "DATA_FROM_DRIVER",
            PacketType::PortAgentCommand => "PORT_AGENT_COMMAND",
            PacketType::PortAgentStatus => "PORT_AGENT_STATUS",
            PacketType::PortAgentFault => "PORT_AGENT_FAULT",
            PacketType::PortAgentConfig => "PORT_AGENT_CONFIG",
            PacketType::DigiCmd => "DIGI_CMD",
            PacketType::DigiRsp => "DIGI_RSP",
            PacketType::Heartbeat => "HEARTBEAT",
            PacketType::PickledFromInstrument => "PICKLED_FROM_INSTRUMENT",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = PortAgentError;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            1 => PacketType::DataFromInstrument,
            2 => PacketType::DataFromDriver,
            3 => PacketType::PortAgentCommand,
            4 => PacketType::PortAgentStatus,
            5 => PacketType::PortAgentFault,
            6 => PacketType::PortAgentConfig,
            7 => PacketType::DigiCmd,
            8 => PacketType::DigiRsp,
            9 => PacketType::Heartbeat,
            10 => PacketType::PickledFromInstrument,
            other => {
                return Err(PortAgentError::Protocol(format!(
                    "Unknown packet type {}",
                    other
                )))
            }
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded header from wire format.
///
/// The type byte is kept raw so that a header with an unknown type can still
/// be used to consume its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// The three sync bytes as received.
    pub sync: [u8; 3],
    /// Raw packet type code.
    pub type_code: u8,
    /// Total packet length, header included.
    pub total_length: u16,
    /// LRC checksum (only the low byte is ever non-zero for valid packets).
    pub checksum: u16,
    /// Port agent timestamp.
    pub timestamp: Timestamp,
}

impl Header {
    /// Create a header for an outbound packet with a zeroed checksum slot.
    ///
    /// Fails if the payload does not fit the 16-bit length field.
    pub fn new(packet_type: PacketType, payload_length: usize, timestamp: Timestamp) -> Result<Self> {
        let total_length = HEADER_SIZE
            .checked_add(payload_length)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| {
                PortAgentError::Protocol(format!(
                    "Payload size {} exceeds maximum {}",
                    payload_length, MAX_PAYLOAD_SIZE
                ))
            })?;
        Ok(Self {
            sync: SYNC,
            type_code: packet_type.code(),
            total_length,
            checksum: 0,
            timestamp,
        })
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use port_agent_client::protocol::{Header, PacketType, Timestamp};
    ///
    /// let header = Header::new(PacketType::DataFromDriver, 5, Timestamp::ZERO).unwrap();
    /// let bytes = header.encode();
    /// assert_eq!(&bytes[..3], &[0xA3, 0x9D, 0x7A]);
    /// assert_eq!(bytes[5], 21);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..3].copy_from_slice(&self.sync);
        buf[3] = self.type_code;
        buf[4..6].copy_from_slice(&self.total_length.to_be_bytes());
        buf[CHECKSUM_RANGE].copy_from_slice(&self.checksum.to_be_bytes());
        buf[8..12].copy_from_slice(&self.timestamp.seconds.to_be_bytes());
        buf[12..16].copy_from_slice(&self.timestamp.fraction.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Fails if fewer than 16 bytes are supplied or the announced length is
    /// shorter than the header itself.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(PortAgentError::Protocol(format!(
                "Header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let total_length = u16::from_be_bytes([buf[4], buf[5]]);
        if (total_length as usize) < HEADER_SIZE {
            return Err(PortAgentError::Protocol(format!(
                "Packet length {} is shorter than the header",
                total_length
            )));
        }

        Ok(Self {
            sync: [buf[0], buf[1], buf[2]],
            type_code: buf[3],
            total_length,
            checksum: u16::from_be_bytes([buf[6], buf[7]]),
            timestamp: Timestamp {
                seconds: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
                fraction: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            },
        })
    }

    /// Payload length announced by this header.
    #[inline]
    pub fn payload_length(&self) -> usize {
        self.total_length as usize - HEADER_SIZE
    }

    /// Typed packet type, failing on codes outside the protocol.
    pub fn packet_type(&self) -> Result<PacketType> {
        PacketType::try_from(self.type_code)
    }

    /// Check the sync bytes and type code.
    pub fn validate(&self) -> Result<()> {
        if self.sync != SYNC {
            return Err(PortAgentError::Protocol(format!(
                "Bad sync bytes {:02X?}",
                self.sync
            )));
        }
        self.packet_type().map(|_| ())
    }
}

/// Decode a header (standalone function).
///
/// Returns `(type_code, payload_length, checksum, timestamp)`.
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<(u8, usize, u16, Timestamp)> {
    let header = Header::decode(buf)?;
    Ok((
        header.type_code,
        header.payload_length(),
        header.checksum,
        header.timestamp,
    ))
}
