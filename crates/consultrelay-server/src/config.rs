//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use consultrelay_protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default address the relay listens on.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the TCP listener to.
    pub listen_addr: SocketAddr,

    /// Largest accepted frame payload, and largest reassembled message.
    pub max_frame_size: u64,

    /// Time allowed for the HTTP request head (and login body) to arrive.
    pub handshake_timeout: Duration,

    /// Time allowed between the upgrade and an accepted `join`.
    pub join_timeout: Duration,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Time allowed for a single socket write before the peer is dropped.
    pub write_timeout: Duration,

    /// Time open sessions get to finish after shutdown before they are
    /// aborted.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            handshake_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(30),
            max_connections: 100,
            write_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `listen_addr`.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_max_frame_size(mut self, max: u64) -> Self {
        self.max_frame_size = max;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Returns [`DEFAULT_LISTEN_ADDR`] as a socket address.
pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
