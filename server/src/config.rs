//! Server configuration

use crate::error::{Result, ServerError};
use shared::protocol::DEFAULT_MAX_CONTENT_LENGTH;
use shared::{DEFAULT_PORT, GRID_SIZE};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Tunables for one reactor instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listening socket binds to; port 0 picks a free port.
    pub addr: SocketAddr,
    pub grid_size: u32,
    /// Upper bound on one poll call, which is also the granularity of periodic work.
    pub poll_timeout: Duration,
    /// Broadcast a heartbeat this often. Disabled when `None`.
    pub heartbeat_interval: Option<Duration>,
    /// Close connections that have sent nothing for this long. Disabled when `None`.
    pub idle_timeout: Option<Duration>,
    pub max_content_length: usize,
    /// Outbound bytes a single connection may have queued before it is dropped as a
    /// slow consumer.
    pub max_send_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            grid_size: GRID_SIZE,
            poll_timeout: Duration::from_millis(100),
            heartbeat_interval: None,
            idle_timeout: None,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            max_send_buffer: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Default configuration bound to an ephemeral localhost port.
    pub fn ephemeral() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_size < 3 {
            return Err(ServerError::Config(format!(
                "grid size must be at least 3, got {}",
                self.grid_size
            )));
        }
        if self.poll_timeout.is_zero() {
            return Err(ServerError::Config("poll timeout must be positive".into()));
        }
        if self.heartbeat_interval.is_some_and(|d| d.is_zero()) {
            return Err(ServerError::Config("heartbeat interval must be positive".into()));
        }
        if self.max_send_buffer == 0 {
            return Err(ServerError::Config("send buffer limit must be positive".into()));
        }
        Ok(())
    }
}
