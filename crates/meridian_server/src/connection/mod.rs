//! Connection management for client connections.
//!
//! Tracks the lifecycle of each accepted socket: id assignment, the
//! player-id transition, message routing and cleanup on disconnect.

pub mod client;
pub mod handler;
pub mod manager;

pub use client::ClientConnection;
pub use manager::{ConnectionManager, ConnectionSender};

/// Identifier for one accepted client connection.
pub type ConnectionId = usize;
