//! Configuration for cmdlink
//!
//! Centralized server configuration with sensible defaults.

use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Disable Nagle's algorithm on accepted sockets
    pub nodelay: bool,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Largest accepted frame payload (in bytes)
    pub max_frame_size: usize,

    /// Log every packet in and out at debug level
    pub log_traffic: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9091".to_string(),
            max_connections: 1024,
            nodelay: true,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            log_traffic: false,
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the largest accepted frame payload (in bytes)
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.config.max_frame_size = bytes;
        self
    }

    pub fn log_traffic(mut self, enabled: bool) -> Self {
        self.config.log_traffic = enabled;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
