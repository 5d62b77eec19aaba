//! Server configuration types and defaults.

use meridian_sessions::SessionConfig;
use std::net::SocketAddr;

/// Configuration for the connection server.
///
/// Network settings plus the session-manager tunables the server wires
/// through when it constructs its [`SessionManager`].
///
/// [`SessionManager`]: meridian_sessions::SessionManager
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to.
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed. Excess sockets are
    /// accepted and immediately dropped with a warning.
    pub max_connections: usize,

    /// Size of the per-connection read buffer. One read of up to this many
    /// bytes yields one packet for the pipeline.
    pub read_buffer_size: usize,

    /// Session manager tunables.
    pub sessions: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080"
                .parse()
                .expect("default bind address must parse"),
            max_connections: 1000,
            read_buffer_size: 4096,
            sessions: SessionConfig::default(),
        }
    }
}
