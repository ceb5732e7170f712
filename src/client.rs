//! Client builder and connection lifecycle.
//!
//! The [`ClientBuilder`] collects the configuration and the event destination.
//! The [`PortAgentClient`] manages the lifecycle:
//! 1. Connect the data socket
//! 2. Spawn the listener (and its heartbeat monitor)
//! 3. Ask the agent for its state and config over the command port
//! 4. Send data until `stop_comms` or a fatal event
//!
//! # Example
//!
//! ```ignore
//! use port_agent_client::{ClientEvent, PortAgentClient, PortAgentConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PortAgentConfig::new("localhost", 4001, Some(4002));
//!     let (client, mut events) = PortAgentClient::builder(config).build_with_channel()?;
//!
//!     client.init_comms().await?;
//!     client.send(b"ts\r\n").await;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ClientEvent::Packet(packet) => println!("{:?}", packet.payload()),
//!             ClientEvent::Recoverable(e) => eprintln!("bad packet: {}", e),
//!             ClientEvent::Fatal(_) => break,
//!         }
//!     }
//!
//!     client.stop_comms().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PortAgentConfig;
use crate::error::{PortAgentError, Result};
use crate::event::{ClientEvent, Escalator, EventSink};
use crate::heartbeat::HeartbeatMonitor;
use crate::listener::{Listener, ListenerControl, ListenerState};
use crate::transport::{CommandChannel, DataConnection};

/// Builder for configuring and creating a port agent client.
pub struct ClientBuilder {
    config: PortAgentConfig,
    sink: Option<EventSink>,
}

impl ClientBuilder {
    pub fn new(config: PortAgentConfig) -> Self {
        Self { config, sink: None }
    }

    /// Deliver events to a closure running on the listener task.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(ClientEvent) + Send + Sync + 'static,
    {
        self.sink = Some(EventSink::new(callback));
        self
    }

    /// Deliver events to an existing sink.
    pub fn sink(mut self, sink: EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the expected heartbeat interval in seconds (0 disables).
    pub fn heartbeat_interval(mut self, secs: u64) -> Self {
        self.config.heartbeat_interval = secs;
        self
    }

    /// Set how many heartbeats may be missed before the connection fails.
    pub fn max_missed_heartbeats(mut self, count: u32) -> Self {
        self.config.max_missed_heartbeats = count;
        self
    }

    /// Set the would-block retry bound for sends.
    pub fn max_send_attempts(mut self, attempts: u32) -> Self {
        self.config.max_send_attempts = attempts;
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// Without a registered callback, events are only logged.
    pub fn build(self) -> Result<PortAgentClient> {
        self.config.validate()?;
        let sink = self.sink.unwrap_or_else(EventSink::logging);
        Ok(PortAgentClient::new(self.config, sink))
    }

    /// Build a client whose events arrive on the returned channel.
    pub fn build_with_channel(
        self,
    ) -> Result<(PortAgentClient, mpsc::UnboundedReceiver<ClientEvent>)> {
        let (sink, rx) = EventSink::channel();
        let client = self.sink(sink).build()?;
        Ok((client, rx))
    }
}

/// One open connection: data socket plus the listener reading it.
struct Session {
    data: Arc<DataConnection>,
    control: Arc<ListenerControl>,
    listener: JoinHandle<()>,
}

/// A client for one port agent.
///
/// Received data and failures are reported through the event sink; the only
/// error returned directly is a failure to connect in [`init_comms`].
///
/// [`init_comms`]: PortAgentClient::init_comms
pub struct PortAgentClient {
    config: PortAgentConfig,
    sink: EventSink,
    commands: CommandChannel,
    session: Mutex<Option<Session>>,
}

impl PortAgentClient {
    pub fn builder(config: PortAgentConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    fn new(config: PortAgentConfig, sink: EventSink) -> Self {
        Self {
            commands: CommandChannel::new(&config),
            config,
            sink,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PortAgentConfig {
        &self.config
    }

    /// Connect, start the listener and resynchronize the agent's state.
    ///
    /// Any previous connection is torn down first. If the data port cannot
    /// be reached the listener is not started.
    pub async fn init_comms(&self) -> Result<()> {
        self.stop_comms().await;

        let control = Arc::new(ListenerControl::new());
        let escalator = Arc::new(Escalator::new(self.sink.clone(), control.clone()));

        let data = Arc::new(DataConnection::connect(&self.config, escalator.clone()).await?);
        let socket = data.socket().ok_or(PortAgentError::NotConnected)?;

        let heartbeat = self.config.heartbeat_period().map(|period| {
            Arc::new(HeartbeatMonitor::new(
                period,
                self.config.missed_heartbeat_limit(),
            ))
        });

        let listener = Listener::new(
            socket,
            self.sink.clone(),
            escalator,
            control.clone(),
            self.config.poll_interval(),
            heartbeat,
        )
        .spawn();

        *self.session() = Some(Session {
            data,
            control,
            listener,
        });

        self.resync().await;
        Ok(())
    }

    /// Ask the agent for its state and config; replies arrive as packets.
    async fn resync(&self) {
        if !self.commands.is_configured() {
            tracing::warn!(host = %self.config.host, "No command port configured, skipping state resync");
            return;
        }
        if let Err(e) = self.commands.send_get_state().await {
            tracing::warn!("get_state failed: {}", e);
        }
        if let Err(e) = self.commands.send_get_config().await {
            tracing::warn!("get_config failed: {}", e);
        }
    }

    /// Stop the listener, wait for it (bounded) and close the data socket.
    ///
    /// Safe to call any number of times.
    pub async fn stop_comms(&self) {
        let session = self.session().take();
        let Some(session) = session else {
            return;
        };
        tracing::info!("Port agent client shutting down comms");

        session.control.request_stop();
        let abort = session.listener.abort_handle();
        match tokio::time::timeout(self.config.stop_timeout(), session.listener).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Listener task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!("Listener did not stop in time, aborting");
                abort.abort();
            }
        }

        session.data.close();
        tracing::info!("Port agent client stopped");
    }

    /// Send raw bytes to the instrument through the agent.
    ///
    /// Returns the number of bytes written. Failures are escalated as a
    /// `Fatal` event rather than returned.
    pub async fn send(&self, data: &[u8]) -> usize {
        let connection = self.session().as_ref().map(|s| s.data.clone());
        match connection {
            Some(connection) => connection.send(data).await,
            None => {
                tracing::error!("Send without a port agent connection");
                self.sink
                    .deliver(ClientEvent::Fatal(PortAgentError::NotConnected));
                0
            }
        }
    }

    /// Ask the agent to send a break of `duration_secs` seconds.
    pub async fn send_break(&self, duration_secs: u64) -> Result<()> {
        self.commands.send_break(duration_secs).await
    }

    pub async fn send_get_config(&self) -> Result<()> {
        self.commands.send_get_config().await
    }

    pub async fn send_get_state(&self) -> Result<()> {
        self.commands.send_get_state().await
    }

    /// State of the current listener, `None` when not connected.
    pub fn listener_state(&self) -> Option<ListenerState> {
        self.session().as_ref().map(|s| s.control.state())
    }

    /// Whether a connection is open and its listener still running.
    pub fn is_connected(&self) -> bool {
        self.listener_state() == Some(ListenerState::Running)
    }
}
