//! Data connection to the port agent.
//!
//! The data socket stays open for the life of a connection. Reads belong to
//! the listener task; writes come from the owner through [`DataConnection::send`],
//! which retries a socket that would block a bounded number of times before
//! escalating.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::TcpStream;

use super::PacketSocket;
use crate::config::PortAgentConfig;
use crate::error::{PortAgentError, Result};
use crate::event::Escalator;

/// Long-lived socket to the port agent's data port.
#[derive(Debug)]
pub struct DataConnection<S: PacketSocket = TcpStream> {
    host: String,
    port: u16,
    socket: Mutex<Option<Arc<S>>>,
    max_attempts: u32,
    poll_interval: Duration,
    escalator: Arc<Escalator>,
}

impl DataConnection<TcpStream> {
    /// Connect to the data port and disable Nagle.
    pub(crate) async fn connect(
        config: &PortAgentConfig,
        escalator: Arc<Escalator>,
    ) -> Result<Self> {
        let host = config.host.as_str();
        let port = config.data_port;

        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect((host, port)))
            .await
            .map_err(|_| PortAgentError::connection(host, port, "connect timed out"))?
            .map_err(|e| PortAgentError::connection(host, port, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| PortAgentError::connection(host, port, e))?;

        tracing::info!(host, port, "Connected to port agent data port");
        Ok(Self::from_socket(stream, config, escalator))
    }
}

impl<S: PacketSocket> DataConnection<S> {
    /// Wrap an already connected socket.
    pub(crate) fn from_socket(socket: S, config: &PortAgentConfig, escalator: Arc<Escalator>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.data_port,
            socket: Mutex::new(Some(Arc::new(socket))),
            max_attempts: config.max_send_attempts,
            poll_interval: config.poll_interval(),
            escalator,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<S>>> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared handle to the socket, if still open.
    pub(crate) fn socket(&self) -> Option<Arc<S>> {
        self.slot().clone()
    }

    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    /// Write all of `data`, returning the number of bytes sent.
    ///
    /// A would-block is retried after `poll_interval`, at most `max_attempts`
    /// times in a row. Running out of retries, or any other socket error,
    /// escalates a fatal error, closes the connection and returns early.
    pub async fn send(&self, data: &[u8]) -> usize {
        let Some(socket) = self.socket() else {
            tracing::error!(host = %self.host, port = self.port, "No socket defined");
            self.escalator.escalate(PortAgentError::NotConnected);
            return 0;
        };

        let mut sent = 0;
        let mut would_block = 0u32;

        while sent < data.len() {
            match socket.try_write(&data[sent..]) {
                Ok(0) => {
                    self.fail(PortAgentError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    )));
                    break;
                }
                Ok(n) => {
                    tracing::trace!(sent = n, remaining = data.len() - sent - n, "TX bytes");
                    sent += n;
                    would_block = 0;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    would_block += 1;
                    if would_block > self.max_attempts {
                        self.fail(PortAgentError::SendRetriesExhausted {
                            attempts: would_block,
                        });
                        break;
                    }
                    tracing::warn!(
                        host = %self.host,
                        port = self.port,
                        tries = would_block,
                        "Send would block, retrying"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!(host = %self.host, port = self.port, "Socket error while sending: {}", e);
                    self.fail(PortAgentError::Io(e));
                    break;
                }
            }
        }

        sent
    }

    fn fail(&self, error: PortAgentError) {
        self.escalator.escalate(error);
        self.close();
    }

    /// Drop this connection's handle to the socket. Idempotent.
    pub fn close(&self) {
        if self.slot().take().is_some() {
            tracing::info!(host = %self.host, port = self.port, "Port agent data socket closed");
        }
    }
}
