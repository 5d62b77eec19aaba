//! Player registry collaborator.
//!
//! The connection server consumes the registry through a narrow async
//! trait: activity bookkeeping on every packet and the offline transition
//! during connection cleanup. The in-memory implementation here is what the
//! stock binary runs with; an embedding application can supply its own
//! backed by whatever player store it keeps.

use async_trait::async_trait;
use dashmap::DashMap;
use meridian_message_system::{Clock, PlayerId, SystemClock};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Per-player bookkeeping consumed by the connection server.
#[async_trait]
pub trait PlayerRegistry: Send + Sync {
    /// Stamps the player's last-activity time with the registry's clock.
    async fn update_last_activity(&self, player_id: &PlayerId);

    /// Marks the player offline.
    async fn mark_offline(&self, player_id: &PlayerId);

    /// Records the player's last-login time.
    async fn set_last_login(&self, player_id: &PlayerId, timestamp_ms: u64);

    /// Drops any per-connection context held for the player.
    async fn clear_connection_context(&self, player_id: &PlayerId);

    /// Cancels every background task running on the player's behalf.
    async fn stop_player_tasks(&self, player_id: &PlayerId);
}

/// DashMap-backed registry used by the stock server binary and the tests.
pub struct InMemoryPlayerRegistry {
    clock: Arc<dyn Clock>,
    last_activity: DashMap<PlayerId, u64>,
    last_login: DashMap<PlayerId, u64>,
    online: DashMap<PlayerId, bool>,
    contexts: DashMap<PlayerId, serde_json::Value>,
    tasks: DashMap<PlayerId, Vec<JoinHandle<()>>>,
}

impl InMemoryPlayerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_activity: DashMap::new(),
            last_login: DashMap::new(),
            online: DashMap::new(),
            contexts: DashMap::new(),
            tasks: DashMap::new(),
        }
    }

    /// Marks a player online. Handlers call this once they have identified
    /// the connection.
    pub fn mark_online(&self, player_id: &PlayerId) {
        self.online.insert(player_id.clone(), true);
    }

    /// Attaches per-connection context to a player.
    pub fn set_connection_context(&self, player_id: &PlayerId, context: serde_json::Value) {
        self.contexts.insert(player_id.clone(), context);
    }

    /// Tracks a background task owned by a player so cleanup can cancel it.
    pub fn track_task(&self, player_id: &PlayerId, handle: JoinHandle<()>) {
        self.tasks.entry(player_id.clone()).or_default().push(handle);
    }

    pub fn is_online(&self, player_id: &PlayerId) -> bool {
        self.online.get(player_id).map(|v| *v).unwrap_or(false)
    }

    pub fn last_activity(&self, player_id: &PlayerId) -> Option<u64> {
        self.last_activity.get(player_id).map(|v| *v)
    }

    pub fn last_login(&self, player_id: &PlayerId) -> Option<u64> {
        self.last_login.get(player_id).map(|v| *v)
    }

    pub fn connection_context(&self, player_id: &PlayerId) -> Option<serde_json::Value> {
        self.contexts.get(player_id).map(|v| v.clone())
    }
}

impl Default for InMemoryPlayerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl PlayerRegistry for InMemoryPlayerRegistry {
    async fn update_last_activity(&self, player_id: &PlayerId) {
        self.last_activity
            .insert(player_id.clone(), self.clock.now_millis());
    }

    async fn mark_offline(&self, player_id: &PlayerId) {
        self.online.insert(player_id.clone(), false);
        debug!(player = %player_id, "player marked offline");
    }

    async fn set_last_login(&self, player_id: &PlayerId, timestamp_ms: u64) {
        self.last_login.insert(player_id.clone(), timestamp_ms);
    }

    async fn clear_connection_context(&self, player_id: &PlayerId) {
        self.contexts.remove(player_id);
    }

    async fn stop_player_tasks(&self, player_id: &PlayerId) {
        if let Some((_, handles)) = self.tasks.remove(player_id) {
            let count = handles.len();
            for handle in handles {
                handle.abort();
            }
            if count > 0 {
                debug!(player = %player_id, count, "stopped player tasks");
            }
        }
    }
}
