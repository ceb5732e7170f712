//! Command channel to the port agent.
//!
//! Commands are newline-terminated ASCII lines. Each command opens a fresh
//! connection to the command port, writes the line and closes; the agent's
//! reply, if any, arrives later as a packet on the data socket.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::PortAgentConfig;
use crate::error::{PortAgentError, Result};

/// Prefix of the break command; the duration in seconds follows.
pub const BREAK_COMMAND: &str = "break";
pub const GET_CONFIG_COMMAND: &str = "get_config";
pub const GET_STATE_COMMAND: &str = "get_state";

/// Fire-and-forget sender for port agent commands.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    host: String,
    port: Option<u16>,
    connect_timeout: Duration,
}

impl CommandChannel {
    pub fn new(config: &PortAgentConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.cmd_port,
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Whether a usable command port is configured.
    pub fn is_configured(&self) -> bool {
        matches!(self.port, Some(p) if p != 0)
    }

    /// Send one command line, appending the newline if missing.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let port = match self.port {
            Some(p) if p != 0 => p,
            _ => {
                return Err(PortAgentError::MissingCommandPort {
                    host: self.host.clone(),
                })
            }
        };

        let mut line = command.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        let host = self.host.as_str();
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| PortAgentError::connection(host, port, "connect timed out"))?
            .map_err(|e| PortAgentError::connection(host, port, e))?;
        tracing::debug!(host, port, command = line.trim_end(), "Connected to port agent command port");

        stream
            .set_nodelay(true)
            .map_err(|e| PortAgentError::connection(host, port, e))?;
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| PortAgentError::connection(host, port, e))?;
        stream
            .shutdown()
            .await
            .map_err(|e| PortAgentError::connection(host, port, e))?;

        Ok(())
    }

    /// Ask the agent to send a break of `duration_secs` to the instrument.
    pub async fn send_break(&self, duration_secs: u64) -> Result<()> {
        self.send_command(&format!("{} {}", BREAK_COMMAND, duration_secs))
            .await
    }

    pub async fn send_get_config(&self) -> Result<()> {
        self.send_command(GET_CONFIG_COMMAND).await
    }

    pub async fn send_get_state(&self) -> Result<()> {
        self.send_command(GET_STATE_COMMAND).await
    }
}
