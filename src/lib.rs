//! # port-agent-client
//!
//! Rust client for the instrument port agent.
//!
//! The port agent owns a physical or serial instrument link and exposes it
//! over TCP. Instrument drivers use this crate to talk to it.
//!
//! ## Architecture
//!
//! - **Data port**: long-lived socket carrying framed binary packets
//!   (16-byte header with sync bytes, type, length, LRC checksum, timestamp)
//! - **Command port**: one short connection per newline-terminated command
//!   (`break <secs>`, `get_config`, `get_state`)
//! - **Listener**: background task that reassembles packets, filters
//!   heartbeats and detects a dead connection
//!
//! ## Example
//!
//! ```ignore
//! use port_agent_client::{ClientEvent, PortAgentClient, PortAgentConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = PortAgentClient::builder(PortAgentConfig::new("localhost", 4001, Some(4002)))
//!         .on_event(|event| match event {
//!             ClientEvent::Packet(packet) => println!("{} bytes", packet.payload_len()),
//!             ClientEvent::Recoverable(e) => eprintln!("skipped: {}", e),
//!             ClientEvent::Fatal(e) => eprintln!("connection lost: {}", e),
//!         })
//!         .build()
//!         .unwrap();
//!
//!     client.init_comms().await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod listener;
pub mod logging;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{ClientBuilder, PortAgentClient};
pub use config::PortAgentConfig;
pub use error::{PortAgentError, Result};
pub use event::{ClientEvent, EventSink};
pub use protocol::{Packet, PacketType};
