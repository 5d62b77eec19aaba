//! Per-invocation handler context and the raw connection capability.

use crate::handler::DispatchError;
use crate::types::PlayerId;
use crate::utils::{ascii_safe, hex_peek};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Byte sink and identity port back onto one client connection.
///
/// Implemented by the connection server; handlers only ever see it through
/// [`HandlerContext`]. Methods return pinned futures so the trait stays
/// object-safe while still suspending on socket writes.
pub trait RawSender: Send + Sync {
    /// Queues raw bytes for delivery on the connection.
    fn send_raw(
        &self,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>>;

    /// Assigns the connection's player id. The transition from the
    /// undetermined sentinel happens at most once; later calls are ignored
    /// by the connection server.
    fn update_player_id(
        &self,
        new_id: PlayerId,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>>;
}

/// Context handed to a handler for one `(message, handler)` pairing.
///
/// A fresh context is built per handler invocation, carrying a snapshot of
/// the connection's player id and the write capability for that connection.
pub struct HandlerContext {
    player_id: PlayerId,
    sender: Arc<dyn RawSender>,
}

impl HandlerContext {
    /// Builds a context bound to one connection.
    pub fn new(player_id: PlayerId, sender: Arc<dyn RawSender>) -> Self {
        Self { player_id, sender }
    }

    /// The player id the connection carried when the message arrived.
    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    /// Writes raw bytes back to the client.
    ///
    /// With `log_output` set, a debug record of the outgoing bytes is
    /// emitted; `log_full` switches that record from a short peek to the
    /// complete payload.
    pub async fn send_raw(
        &self,
        bytes: &[u8],
        log_output: bool,
        log_full: bool,
    ) -> Result<(), DispatchError> {
        if log_output {
            if log_full {
                debug!(
                    size = bytes.len(),
                    ascii = %ascii_safe(bytes),
                    hex = %hex_peek(bytes, bytes.len()),
                    player = %self.player_id,
                    "sending raw bytes"
                );
            } else {
                debug!(
                    size = bytes.len(),
                    peek = %hex_peek(bytes, 20),
                    player = %self.player_id,
                    "sending raw bytes"
                );
            }
        }
        self.sender
            .send_raw(bytes.to_vec())
            .await
            .map_err(DispatchError::Send)
    }

    /// Promotes the connection from the undetermined sentinel to a real
    /// player id.
    pub async fn update_player_id(&self, new_id: PlayerId) -> Result<(), DispatchError> {
        self.sender
            .update_player_id(new_id)
            .await
            .map_err(DispatchError::Send)
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("player_id", &self.player_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Test sender that records writes and player-id updates.
    #[derive(Default)]
    struct RecordingSender {
        writes: Mutex<Vec<Vec<u8>>>,
        ids: Mutex<Vec<PlayerId>>,
    }

    impl RawSender for RecordingSender {
        fn send_raw(
            &self,
            bytes: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
            Box::pin(async move {
                self.writes.lock().push(bytes);
                Ok(())
            })
        }

        fn update_player_id(
            &self,
            new_id: PlayerId,
        ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
            Box::pin(async move {
                self.ids.lock().push(new_id);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn send_raw_forwards_bytes() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = HandlerContext::new(PlayerId::undetermined(), sender.clone());

        ctx.send_raw(&[5, 5, 5], true, true).await.unwrap();
        ctx.send_raw(&[6], false, false).await.unwrap();

        assert_eq!(*sender.writes.lock(), vec![vec![5, 5, 5], vec![6]]);
    }

    #[tokio::test]
    async fn update_player_id_reaches_the_connection() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = HandlerContext::new(PlayerId::undetermined(), sender.clone());

        ctx.update_player_id(PlayerId::new("pid-1")).await.unwrap();
        assert_eq!(*sender.ids.lock(), vec![PlayerId::new("pid-1")]);
    }
}
