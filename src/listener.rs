//! Listener task.
//!
//! Reads the data socket one packet at a time: exactly 16 header bytes, then
//! exactly the payload length the header announces. Heartbeats feed the
//! [`HeartbeatMonitor`]; every other packet goes to the owner in wire order.
//!
//! ```text
//! RUNNING ──stop()/fatal──► STOPPING ──loop exits──► STOPPED
//! ```
//!
//! The socket is polled: a read that would block sleeps `poll_interval` and
//! the stop flag is checked before every read attempt, so stopping takes up to
//! one poll interval.
//!
//! Failures split two ways. A closed socket or I/O error is fatal: it is
//! escalated once and the listener stops. A header or packet that cannot be
//! decoded is reported as `Recoverable` and the listener carries on.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::task::JoinHandle;

use crate::error::{PortAgentError, Result};
use crate::event::{ClientEvent, Escalator, EventSink};
use crate::heartbeat::HeartbeatMonitor;
use crate::protocol::{Header, Packet, HEADER_SIZE};
use crate::transport::PacketSocket;

/// Lifecycle of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Running,
            1 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

/// Shared stop flag for a listener and its heartbeat monitor.
#[derive(Debug)]
pub struct ListenerControl {
    state: AtomicU8,
}

impl ListenerControl {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ListenerState::Running as u8),
        }
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    /// Ask the listener to stop. Has no effect once it is stopping or stopped.
    pub fn request_stop(&self) {
        let _ = self.state.compare_exchange(
            ListenerState::Running as u8,
            ListenerState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn mark_stopped(&self) {
        self.state
            .store(ListenerState::Stopped as u8, Ordering::Release);
    }
}

impl Default for ListenerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of a port agent connection.
pub(crate) struct Listener<S: PacketSocket> {
    socket: Arc<S>,
    sink: EventSink,
    escalator: Arc<Escalator>,
    control: Arc<ListenerControl>,
    poll_interval: Duration,
    heartbeat: Option<Arc<HeartbeatMonitor>>,
}

impl<S: PacketSocket> Listener<S> {
    pub(crate) fn new(
        socket: Arc<S>,
        sink: EventSink,
        escalator: Arc<Escalator>,
        control: Arc<ListenerControl>,
        poll_interval: Duration,
        heartbeat: Option<Arc<HeartbeatMonitor>>,
    ) -> Self {
        Self {
            socket,
            sink,
            escalator,
            control,
            poll_interval,
            heartbeat,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tracing::info!("Port agent listener started");

        let monitor = self
            .heartbeat
            .clone()
            .map(|m| m.spawn(self.escalator.clone(), self.control.clone()));

        while self.control.is_running() {
            match self.read_packet().await {
                Ok(Some(packet)) => self.dispatch(packet),
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    tracing::error!("Socket error while receiving from port agent: {}", e);
                    self.escalator.escalate(e);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Dropping undecodable packet: {}", e);
                    self.sink.deliver(ClientEvent::Recoverable(e));
                }
            }
        }

        if let Some(task) = monitor {
            task.abort();
        }
        self.control.mark_stopped();
        tracing::info!("Port agent listener done listening");
    }

    /// Read one whole packet. `Ok(None)` means a stop was requested.
    async fn read_packet(&self) -> Result<Option<Packet>> {
        let Some(raw_header) = self.receive_exact(HEADER_SIZE).await? else {
            return Ok(None);
        };
        let header = Header::decode(&raw_header)?;

        let Some(payload) = self.receive_exact(header.payload_length()).await? else {
            return Ok(None);
        };

        // Checked only now so the stream stays aligned on the next header.
        header.validate()?;

        let packet = Packet::from_wire(header, payload);
        if !packet.is_valid() {
            tracing::warn!(
                checksum = packet.checksum(),
                len = packet.payload_len(),
                "Packet checksum mismatch"
            );
        }
        Ok(Some(packet))
    }

    /// Read exactly `count` bytes, polling while the socket would block.
    async fn receive_exact(&self, count: usize) -> Result<Option<Bytes>> {
        let mut buf = BytesMut::zeroed(count);
        let mut filled = 0;

        while filled < count {
            if !self.control.is_running() {
                return Ok(None);
            }
            match self.socket.try_read(&mut buf[filled..]) {
                Ok(0) => return Err(PortAgentError::ConnectionClosed),
                Ok(n) => {
                    filled += n;
                    tracing::trace!(rx = n, left = count - filled, "RX bytes");
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(PortAgentError::Io(e)),
            }
        }

        Ok(Some(buf.freeze()))
    }

    fn dispatch(&self, packet: Packet) {
        if packet.is_heartbeat() {
            tracing::debug!("Heartbeat packet received");
            if let Some(monitor) = &self.heartbeat {
                monitor.beat();
            }
            return;
        }
        self.sink.deliver(ClientEvent::Packet(packet));
    }
}
