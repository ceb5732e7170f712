//! Transport module - sockets to the port agent.
//!
//! - [`DataConnection`]: long-lived data socket, polled without blocking
//! - [`CommandChannel`]: one short-lived connection per text command
//!
//! The data path is written against [`PacketSocket`], a minimal non-blocking
//! read/write seam, so the listener and sender can be driven by a scripted
//! socket in tests.

mod command;
mod data;

pub use command::{CommandChannel, BREAK_COMMAND, GET_CONFIG_COMMAND, GET_STATE_COMMAND};
pub use data::DataConnection;

use std::io;

use tokio::net::TcpStream;

/// Non-blocking socket operations used by the listener and sender.
///
/// Both methods take `&self` so one reader and one writer can share the
/// socket. They must return `ErrorKind::WouldBlock` instead of waiting.
pub trait PacketSocket: Send + Sync + 'static {
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl PacketSocket for TcpStream {
    #[inline]
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    #[inline]
    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }
}
