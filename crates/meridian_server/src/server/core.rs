//! The main `GameServer`: startup, the accept loop and shutdown.

use crate::config::ServerConfig;
use crate::connection::handler::{handle_client, ConnectionResources};
use crate::connection::ConnectionManager;
use crate::error::ServerError;
use crate::players::{InMemoryPlayerRegistry, PlayerRegistry};
use meridian_commands::{CommandDispatcher, JsonCodec};
use meridian_message_system::{Clock, FormatRegistry, MessageDispatcher, SystemClock};
use meridian_sessions::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

/// The connection server and the registries it serves from.
///
/// Construction wires every collaborator; the embedding application then
/// registers its wire formats, handlers and commands before calling
/// [`start`](GameServer::start). Registration after startup is safe but the
/// usual shape is: construct, register, serve.
///
/// # Concurrency
///
/// The accept loop runs in the caller's task; each accepted socket gets its
/// own spawned task whose failure never affects siblings. A broadcast
/// shutdown channel links the accept loop and every connection task:
/// [`shutdown`](GameServer::shutdown) fires it once, and firing it again is
/// harmless.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<FormatRegistry>,
    dispatcher: Arc<MessageDispatcher>,
    commands: Arc<CommandDispatcher>,
    sessions: Arc<SessionManager>,
    players: Arc<dyn PlayerRegistry>,
    connection_manager: Arc<ConnectionManager>,
    resources: Arc<ConnectionResources>,
    shutdown_sender: broadcast::Sender<()>,
    listener: Mutex<Option<TcpListener>>,
}

impl GameServer {
    /// Creates a server with the stock collaborators: the system clock and
    /// an in-memory player registry.
    pub fn new(config: ServerConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let players: Arc<dyn PlayerRegistry> =
            Arc::new(InMemoryPlayerRegistry::new(clock.clone()));
        Self::with_collaborators(config, clock, players)
    }

    /// Creates a server with injected time source and player registry.
    pub fn with_collaborators(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
        players: Arc<dyn PlayerRegistry>,
    ) -> Self {
        let registry = Arc::new(FormatRegistry::new());
        let dispatcher = Arc::new(MessageDispatcher::new());
        let commands = Arc::new(CommandDispatcher::new(JsonCodec::default()));
        let sessions = Arc::new(SessionManager::new(clock.clone(), config.sessions.clone()));
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_sender, _) = broadcast::channel(1);

        let resources = Arc::new(ConnectionResources {
            manager: connection_manager.clone(),
            registry: registry.clone(),
            dispatcher: dispatcher.clone(),
            players: players.clone(),
            clock,
            read_buffer_size: config.read_buffer_size,
        });

        Self {
            config,
            registry,
            dispatcher,
            commands,
            sessions,
            players,
            connection_manager,
            resources,
            shutdown_sender,
            listener: Mutex::new(None),
        }
    }

    /// Binds the listening socket and returns the bound address.
    ///
    /// Splitting bind from [`start`](GameServer::start) lets callers bind to
    /// port 0 and learn the real port before serving — the integration
    /// tests rely on it. Calling `start` without `bind` binds implicitly.
    pub async fn bind(&self) -> Result<SocketAddr, ServerError> {
        let mut slot = self.listener.lock().await;
        if slot.is_none() {
            let listener = TcpListener::bind(self.config.bind_address)
                .await
                .map_err(|e| {
                    ServerError::Network(format!(
                        "failed to bind {}: {e}",
                        self.config.bind_address
                    ))
                })?;
            *slot = Some(listener);
        }
        slot.as_ref()
            .expect("listener just stored")
            .local_addr()
            .map_err(|e| ServerError::Network(format!("local_addr failed: {e}")))
    }

    /// Runs the server until shutdown.
    ///
    /// Starts the session sweeper, then accepts connections and spawns one
    /// task per socket. Returns after the shutdown signal has fired and the
    /// collaborators have been torn down.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.bind().await?;
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .expect("bind just ensured a listener");
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("local_addr failed: {e}")))?;

        self.sessions.start();
        info!(addr = %local_addr, "🚀 server listening");

        let mut shutdown_rx = self.shutdown_sender.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if self.connection_manager.connection_count() >= self.config.max_connections {
                                warn!(%addr, limit = self.config.max_connections,
                                      "connection limit reached; refusing connection");
                                drop(stream);
                                continue;
                            }
                            let resources = self.resources.clone();
                            let shutdown_rx = self.shutdown_sender.subscribe();
                            tokio::spawn(handle_client(stream, addr, resources, shutdown_rx));
                        }
                        Err(e) => {
                            error!("failed to accept connection: {e}");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        info!("🧹 tearing down collaborators");
        self.sessions.shutdown().await;
        self.connection_manager.close_all().await;
        info!("server stopped");
        Ok(())
    }

    /// Signals the server to stop. Idempotent; safe to call from anywhere.
    pub fn shutdown(&self) {
        let _ = self.shutdown_sender.send(());
    }

    /// The wire-format registry; populate during startup.
    pub fn format_registry(&self) -> Arc<FormatRegistry> {
        self.registry.clone()
    }

    /// The message dispatcher; populate during startup.
    pub fn message_dispatcher(&self) -> Arc<MessageDispatcher> {
        self.dispatcher.clone()
    }

    /// The command dispatcher; populate during startup.
    pub fn command_dispatcher(&self) -> Arc<CommandDispatcher> {
        self.commands.clone()
    }

    /// The session manager.
    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    /// The player registry collaborator.
    pub fn player_registry(&self) -> Arc<dyn PlayerRegistry> {
        self.players.clone()
    }

    /// Number of live client connections.
    pub fn connection_count(&self) -> usize {
        self.connection_manager.connection_count()
    }
}
