//! Error types for port-agent-client.

use thiserror::Error;

/// Main error type for all port agent operations.
#[derive(Debug, Error)]
pub enum PortAgentError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while parsing configuration or agent config payloads.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Could not connect to one of the port agent's ports.
    #[error("Unable to connect to port agent at {host}:{port} ({reason})")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    /// No command port was configured.
    #[error("Missing port agent command port config for {host} (port unset)")]
    MissingCommandPort { host: String },

    /// Send attempted without an open data connection.
    #[error("No data connection to port agent")]
    NotConnected,

    /// Protocol error (short header, bad length, bad sync, unknown type).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The port agent closed the data socket.
    #[error("Connection closed by port agent")]
    ConnectionClosed,

    /// Too many consecutive heartbeats missed.
    #[error("Maximum allowable port agent heartbeats ({missed}) missed")]
    HeartbeatTimeout { missed: u32 },

    /// The socket kept reporting would-block past the retry bound.
    #[error("Send would-block attempts ({attempts}) exceeded")]
    SendRetriesExhausted { attempts: u32 },

    /// The owner's event callback panicked while handling a packet.
    #[error("Event callback panicked: {0}")]
    CallbackPanicked(String),

    /// Configuration failed validation.
    #[error("Invalid port agent config: {0}")]
    InvalidConfig(String),
}

impl PortAgentError {
    /// Whether this error means the connection must be treated as dead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PortAgentError::Io(_)
                | PortAgentError::Connection { .. }
                | PortAgentError::MissingCommandPort { .. }
                | PortAgentError::NotConnected
                | PortAgentError::ConnectionClosed
                | PortAgentError::HeartbeatTimeout { .. }
                | PortAgentError::SendRetriesExhausted { .. }
        )
    }

    pub(crate) fn connection(host: &str, port: u16, reason: impl ToString) -> Self {
        PortAgentError::Connection {
            host: host.to_string(),
            port,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using PortAgentError.
pub type Result<T> = std::result::Result<T, PortAgentError>;
