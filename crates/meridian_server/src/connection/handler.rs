//! Per-connection read loop and cleanup.

use super::{ConnectionManager, ConnectionSender};
use crate::error::ServerError;
use crate::messaging::process_packet;
use crate::players::PlayerRegistry;
use meridian_message_system::{Clock, FormatRegistry, MessageDispatcher, RawSender};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Shared services a connection task needs.
pub(crate) struct ConnectionResources {
    pub manager: Arc<ConnectionManager>,
    pub registry: Arc<FormatRegistry>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub players: Arc<dyn PlayerRegistry>,
    pub clock: Arc<dyn Clock>,
    pub read_buffer_size: usize,
}

/// Runs one client connection to completion.
///
/// Packets are processed strictly in receive order: the read of packet
/// `i + 1` does not start until packet `i`'s handlers (and their writes)
/// have finished. The loop exits on EOF, on a handler error, or when the
/// server's shutdown signal fires; cleanup runs on every exit path.
pub(crate) async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    resources: Arc<ConnectionResources>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, writer) = stream.into_split();
    let connection_id = resources.manager.add_connection(writer, addr);
    info!(%addr, connection_id, "🔌 client connected");

    let sender: Arc<dyn RawSender> =
        Arc::new(ConnectionSender::new(resources.manager.clone(), connection_id));
    let mut buf = vec![0u8; resources.read_buffer_size];

    let result: Result<(), ServerError> = async {
        loop {
            let n = tokio::select! {
                read = reader.read(&mut buf) => {
                    read.map_err(|e| ServerError::Network(format!("read failed: {e}")))?
                }
                _ = shutdown_rx.recv() => break,
            };
            if n == 0 {
                break;
            }
            let packet = &buf[..n];

            let player_id = resources
                .manager
                .player_id(connection_id)
                .unwrap_or_default();
            resources.players.update_last_activity(&player_id).await;

            let started = Instant::now();
            let message_type = process_packet(
                packet,
                &resources.registry,
                &resources.dispatcher,
                &player_id,
                &sender,
            )
            .await?;
            let duration_ms = started.elapsed().as_millis() as u64;

            if let Some(message_type) = message_type {
                // the player id may have been assigned while handling
                let player_id = resources
                    .manager
                    .player_id(connection_id)
                    .unwrap_or(player_id);
                let who = if player_id.is_determined() {
                    player_id.to_string()
                } else {
                    addr.to_string()
                };
                debug!(
                    message_type = %message_type,
                    player = %who,
                    duration_ms,
                    "packet processed"
                );
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = &result {
        error!(%addr, connection_id, "connection terminated: {e}");
    }

    cleanup(connection_id, &resources).await;
    info!(%addr, connection_id, "👋 client disconnected");
}

/// Tears down one connection: offline bookkeeping for identified players,
/// then the socket itself. Runs exactly once per connection, on every exit
/// path.
async fn cleanup(connection_id: usize, resources: &ConnectionResources) {
    let Some(connection) = resources.manager.remove_connection(connection_id) else {
        return;
    };

    if connection.player_id.is_determined() {
        let player_id = &connection.player_id;
        resources.players.mark_offline(player_id).await;
        resources
            .players
            .set_last_login(player_id, resources.clock.now_millis())
            .await;
        resources.players.clear_connection_context(player_id).await;
        resources.players.stop_player_tasks(player_id).await;
    }

    let _ = connection.writer.lock().await.shutdown().await;
}
