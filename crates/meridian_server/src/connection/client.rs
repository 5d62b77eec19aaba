//! Individual client connection state.

use meridian_message_system::PlayerId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// State tracked for one accepted socket.
///
/// `player_id` starts as the undetermined sentinel and transitions to a real
/// id at most once, via the connection manager. The write half lives behind
/// a mutex so handler output and shutdown can share it.
pub struct ClientConnection {
    /// The remote network address of the client.
    pub remote_addr: SocketAddr,

    /// When this connection was established.
    pub connected_at: SystemTime,

    /// The player behind the connection, once identified.
    pub player_id: PlayerId,

    /// Write half of the socket.
    pub writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl ClientConnection {
    /// Creates connection state for a freshly accepted socket.
    pub fn new(remote_addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            remote_addr,
            connected_at: SystemTime::now(),
            player_id: PlayerId::undetermined(),
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}
