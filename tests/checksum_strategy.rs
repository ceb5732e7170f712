//! Checksum strategy selection.
//!
//! Runs in its own test binary so the strategy can be installed before any
//! checksum is computed in the process.

use bytes::Bytes;
use port_agent_client::protocol::checksum::{self, BytewiseLrc, LrcStrategy, WideLrc};
use port_agent_client::protocol::{decode_packet, encode, verify, HEADER_SIZE, Timestamp};
use port_agent_client::{Packet, PacketType};

/// An installed strategy is the one the codec uses.
#[test]
fn test_installed_bytewise_drives_codec() {
    assert!(checksum::install_bytewise());
    assert_eq!(format!("{:?}", checksum::active()), "BytewiseLrc");
    assert!(!checksum::install(&WideLrc));

    let packet = Packet::outbound_at(
        PacketType::DataFromInstrument,
        Bytes::from_static(b"hello"),
        Timestamp::ZERO,
    )
    .unwrap();
    assert_eq!(packet.checksum(), 50);

    let wire = encode(b"This tests the checksum algorithm.", PacketType::DataFromDriver).unwrap();
    assert!(verify(&wire[..HEADER_SIZE], &wire[HEADER_SIZE..]));

    let decoded = decode_packet(&wire).unwrap();
    assert!(decoded.is_valid());
    assert_eq!(decoded.payload(), b"This tests the checksum algorithm.");

    // Both strategies agree on what the codec wrote.
    let header = &wire[..HEADER_SIZE];
    let payload = &wire[HEADER_SIZE..];
    assert_eq!(
        BytewiseLrc.fold(payload, BytewiseLrc.fold(header, 0)),
        WideLrc.fold(payload, WideLrc.fold(header, 0))
    );
}
