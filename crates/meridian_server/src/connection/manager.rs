//! Connection table and the per-connection write path.

use super::{ClientConnection, ConnectionId};
use dashmap::DashMap;
use meridian_message_system::{PlayerId, RawSender};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Tracks active client connections and the player ids behind them.
///
/// All lookups are backed by `DashMap`, so the manager can be shared freely
/// between the accept loop, per-connection tasks and handlers.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, ClientConnection>,
    players: DashMap<PlayerId, ConnectionId>,
    next_id: AtomicUsize,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            players: DashMap::new(),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Registers a freshly accepted socket and returns its connection id.
    pub fn add_connection(&self, writer: OwnedWriteHalf, remote_addr: SocketAddr) -> ConnectionId {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .insert(connection_id, ClientConnection::new(remote_addr, writer));
        connection_id
    }

    /// Removes a connection, returning its final state for cleanup.
    pub fn remove_connection(&self, connection_id: ConnectionId) -> Option<ClientConnection> {
        let (_, connection) = self.connections.remove(&connection_id)?;
        if connection.player_id.is_determined() {
            self.players.remove(&connection.player_id);
        }
        Some(connection)
    }

    /// The player id currently assigned to a connection.
    pub fn player_id(&self, connection_id: ConnectionId) -> Option<PlayerId> {
        self.connections
            .get(&connection_id)
            .map(|conn| conn.player_id.clone())
    }

    /// The connection currently carrying a player, if any.
    pub fn connection_for_player(&self, player_id: &PlayerId) -> Option<ConnectionId> {
        self.players.get(player_id).map(|id| *id)
    }

    /// Transitions a connection from the undetermined sentinel to a real
    /// player id.
    ///
    /// The transition happens at most once; repeated attempts are ignored
    /// with a warning so a misbehaving handler cannot re-identify a live
    /// connection.
    pub fn assign_player(&self, connection_id: ConnectionId, player_id: PlayerId) -> bool {
        let Some(mut connection) = self.connections.get_mut(&connection_id) else {
            warn!(connection_id, "cannot assign player to unknown connection");
            return false;
        };
        if connection.player_id.is_determined() {
            warn!(
                connection_id,
                current = %connection.player_id,
                rejected = %player_id,
                "player id already assigned; ignoring update"
            );
            return false;
        }
        connection.player_id = player_id.clone();
        drop(connection);
        self.players.insert(player_id.clone(), connection_id);
        debug!(connection_id, player = %player_id, "player identified");
        true
    }

    /// Writes bytes to one connection.
    pub async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        bytes: &[u8],
    ) -> Result<(), String> {
        // clone the writer handle out so no map shard lock is held across
        // the await
        let writer = self
            .connections
            .get(&connection_id)
            .map(|conn| conn.writer.clone())
            .ok_or_else(|| format!("connection {connection_id} is gone"))?;

        let mut writer = writer.lock().await;
        writer
            .write_all(bytes)
            .await
            .map_err(|e| format!("write to connection {connection_id} failed: {e}"))?;
        writer
            .flush()
            .await
            .map_err(|e| format!("flush to connection {connection_id} failed: {e}"))
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Shuts down every connection's write half and clears the table.
    pub async fn close_all(&self) {
        let writers: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.writer.clone())
            .collect();
        for writer in writers {
            let _ = writer.lock().await.shutdown().await;
        }
        self.connections.clear();
        self.players.clear();
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// [`RawSender`] bound to one connection.
///
/// Built once per connection and handed to every handler context created
/// for packets arriving on it.
pub struct ConnectionSender {
    manager: Arc<ConnectionManager>,
    connection_id: ConnectionId,
}

impl ConnectionSender {
    pub fn new(manager: Arc<ConnectionManager>, connection_id: ConnectionId) -> Self {
        Self {
            manager,
            connection_id,
        }
    }
}

impl RawSender for ConnectionSender {
    fn send_raw(
        &self,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        Box::pin(async move {
            self.manager
                .send_to_connection(self.connection_id, &bytes)
                .await
        })
    }

    fn update_player_id(
        &self,
        new_id: PlayerId,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        Box::pin(async move {
            self.manager.assign_player(self.connection_id, new_id);
            Ok(())
        })
    }
}
