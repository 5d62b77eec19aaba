//! # Meridian Server
//!
//! The networked message-processing core of the Meridian game server: a
//! long-lived TCP service that accepts connections, decodes each socket
//! read under a registry of candidate wire formats, and dispatches the
//! materialized messages to typed handlers.
//!
//! ## Design Philosophy
//!
//! The server core carries **no game logic** — it provides infrastructure:
//!
//! * **Connection management** — accept loop, per-connection tasks,
//!   player-id lifecycle and cleanup
//! * **Packet pipeline** — format identification, decode, ambiguity policy
//!   and handler dispatch
//! * **Sessions** — token issuance, verification, refresh and reaping
//! * **Commands** — schema-validated internal operator actions
//!
//! Concrete wire formats, message handlers and commands are registered by
//! the embedding application at startup, through the registries exposed on
//! [`GameServer`].
//!
//! ## Message Flow
//!
//! 1. A client socket read yields one packet.
//! 2. The format registry returns the candidate formats whose cheap
//!    `verify` accepts the bytes (or the built-in fallback).
//! 3. Candidates decode in order; the first success is materialized into a
//!    message, with a warning when several succeed.
//! 4. The dispatcher resolves the handler list for the message's logical
//!    type and runs each handler sequentially; handler output is written
//!    straight back to the socket.
//!
//! ## Failure Containment
//!
//! A failing format is skipped; a failing handler terminates its own
//! connection; nothing that happens on one connection can take down
//! another. Registration-time mistakes (conflicting handler classes,
//! duplicate commands, invalid schemas) fail before serving begins.

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::GameServer;

pub mod config;
pub mod error;
pub mod players;
pub mod server;
pub mod shutdown;

mod connection;
mod messaging;

pub use connection::{ClientConnection, ConnectionId, ConnectionManager};
pub use messaging::EMPTY_PACKET_TYPE;

#[cfg(test)]
mod tests;
