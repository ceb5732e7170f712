//! Client configuration.
//!
//! The process that launches the port agent hands the driver a small comms
//! dict (`{"addr": ..., "port": ..., "cmd_port": ...}`); [`PortAgentConfig`]
//! accepts that shape directly and adds the tuning knobs of the client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PortAgentError, Result};

/// Default heartbeat interval the port agent is expected to honour (seconds).
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 10;

/// Default number of heartbeats that may be missed before giving up.
pub const DEFAULT_MAX_MISSED_HEARTBEATS: u32 = 5;

/// Slack added to the heartbeat interval for late heartbeats (seconds).
pub const DEFAULT_HEARTBEAT_FUDGE: u64 = 1;

/// Upper bound for the heartbeat timer period (seconds).
pub const DEFAULT_MAX_HEARTBEAT_INTERVAL: u64 = 20;

/// Number of would-block retries a send may take.
pub const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 15;

/// Sleep between polls of a socket that would block.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `stop_comms` waits for the listener to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection and liveness settings for one port agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortAgentConfig {
    #[serde(alias = "addr")]
    pub host: String,
    #[serde(alias = "port")]
    pub data_port: u16,
    pub cmd_port: Option<u16>,
    /// Expected heartbeat interval in seconds; 0 disables the monitor.
    pub heartbeat_interval: u64,
    /// 0 falls back to [`DEFAULT_MAX_MISSED_HEARTBEATS`].
    pub max_missed_heartbeats: u32,
    pub heartbeat_fudge: u64,
    pub max_heartbeat_interval: u64,
    pub max_send_attempts: u32,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for PortAgentConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            data_port: 0,
            cmd_port: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_missed_heartbeats: DEFAULT_MAX_MISSED_HEARTBEATS,
            heartbeat_fudge: DEFAULT_HEARTBEAT_FUDGE,
            max_heartbeat_interval: DEFAULT_MAX_HEARTBEAT_INTERVAL,
            max_send_attempts: DEFAULT_MAX_SEND_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT.as_millis() as u64,
        }
    }
}

impl PortAgentConfig {
    /// Create a config for the given host and ports with default tuning.
    pub fn new(host: impl Into<String>, data_port: u16, cmd_port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            data_port,
            cmd_port,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON comms config.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that cannot possibly reach a port agent.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(PortAgentError::InvalidConfig("empty host".to_string()));
        }
        if self.data_port == 0 {
            return Err(PortAgentError::InvalidConfig(
                "data port must be non-zero".to_string(),
            ));
        }
        if self.max_heartbeat_interval == 0 {
            return Err(PortAgentError::InvalidConfig(
                "max_heartbeat_interval must be at least 1".to_string(),
            ));
        }
        if self.max_send_attempts == 0 {
            return Err(PortAgentError::InvalidConfig(
                "max_send_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Heartbeat timer period: interval plus fudge, clamped to the maximum.
    ///
    /// `None` when heartbeat monitoring is disabled.
    pub fn heartbeat_period(&self) -> Option<Duration> {
        if self.heartbeat_interval == 0 {
            return None;
        }
        let secs = self
            .heartbeat_interval
            .saturating_add(self.heartbeat_fudge)
            .min(self.max_heartbeat_interval)
            .max(1);
        Some(Duration::from_secs(secs))
    }

    /// Missed heartbeat budget with the zero fallback applied.
    pub fn missed_heartbeat_limit(&self) -> u32 {
        if self.max_missed_heartbeats == 0 {
            DEFAULT_MAX_MISSED_HEARTBEATS
        } else {
            self.max_missed_heartbeats
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
