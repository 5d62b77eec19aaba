//! Server error types.

use meridian_message_system::DispatchError;
use thiserror::Error;

/// Failures surfaced by the connection server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket-level failures: bind, accept, read, write.
    #[error("Network error: {0}")]
    Network(String),

    /// Handler registration or execution failures.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Everything that should not happen in a healthy server.
    #[error("Internal error: {0}")]
    Internal(String),
}
