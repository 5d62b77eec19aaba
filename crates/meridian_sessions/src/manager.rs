//! Session table, expiry rules and the background sweeper.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use meridian_message_system::Clock;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reserved operator account id.
pub const ADMIN_USER_ID: &str = "meridian-admin";

/// Fixed token handed out for the reserved operator account.
///
/// Every other user gets a fresh UUID per session; the operator token is a
/// well-known constant so out-of-band tooling can authenticate without a
/// login round-trip.
pub const ADMIN_SESSION_TOKEN: &str = "meridian-admin-token";

/// Tunables for session issuance and cleanup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the sweeper scans for lifetime-expired entries.
    pub cleanup_interval: Duration,
    /// Default short expiry applied when `create` is not given one.
    pub session_duration: Duration,
    /// Default absolute lifetime cap applied when `create` is not given one.
    pub session_lifetime: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(5 * 60),
            session_duration: Duration::from_secs(60 * 60),
            session_lifetime: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// A live authentication record keyed by its token.
#[derive(Debug, Clone)]
pub struct UserSession {
    /// Account the session was issued for.
    pub user_id: String,
    /// Opaque bearer token, also the table key.
    pub token: String,
    /// Issuance instant, milliseconds since epoch.
    pub issued_at: u64,
    /// Current short expiry, milliseconds since epoch. Pushed forward by
    /// `refresh`.
    pub expires_at: u64,
    /// Window granted per refresh.
    pub session_duration: Duration,
    /// Absolute cap from `issued_at`, regardless of refreshes.
    pub lifetime: Duration,
}

impl UserSession {
    fn lifetime_exceeded(&self, now: u64) -> bool {
        now.saturating_sub(self.issued_at) > self.lifetime.as_millis() as u64
    }
}

/// Issues, verifies, refreshes and reaps user sessions.
///
/// The table is a concurrent map from token to session; `verify`, `refresh`
/// and `get_user_id` are synchronous and safe to call from any task. The
/// sweeper is a cooperative background task started with [`start`] and
/// joined by [`shutdown`].
///
/// [`start`]: SessionManager::start
/// [`shutdown`]: SessionManager::shutdown
pub struct SessionManager {
    sessions: Arc<DashMap<String, UserSession>>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Creates a manager with the given time source and tunables.
    ///
    /// The sweeper is not running yet; call [`start`](Self::start).
    pub fn new(clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            sessions: Arc::new(DashMap::new()),
            clock,
            config,
            shutdown_tx,
            sweeper: Mutex::new(None),
        }
    }

    /// Spawns the background sweeper. Calling twice is a no-op.
    pub fn start(&self) {
        let mut slot = self.sweeper.lock().expect("sweeper mutex poisoned");
        if slot.is_some() {
            return;
        }

        let sessions = self.sessions.clone();
        let clock = self.clock.clone();
        let interval = self.config.cleanup_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = clock.now_millis();
                        let before = sessions.len();
                        // absolute expiry only: short-expired entries stay,
                        // a successful refresh revives them
                        sessions.retain(|_, session| !session.lifetime_exceeded(now));
                        let removed = before - sessions.len();
                        if removed > 0 {
                            debug!(removed, "swept lifetime-expired sessions");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("session sweeper stopped");
        }));
        info!(
            interval_secs = interval.as_secs(),
            "session sweeper started"
        );
    }

    /// Issues a session for a user.
    ///
    /// `valid_for` and `lifetime` default to the configured values. The
    /// reserved operator account receives the fixed
    /// [`ADMIN_SESSION_TOKEN`]; every other user gets a fresh UUID.
    pub fn create(
        &self,
        user_id: &str,
        valid_for: Option<Duration>,
        lifetime: Option<Duration>,
    ) -> UserSession {
        let valid_for = valid_for.unwrap_or(self.config.session_duration);
        let lifetime = lifetime.unwrap_or(self.config.session_lifetime);

        let token = if user_id == ADMIN_USER_ID {
            ADMIN_SESSION_TOKEN.to_string()
        } else {
            Uuid::new_v4().to_string()
        };

        let now = self.clock.now_millis();
        let session = UserSession {
            user_id: user_id.to_string(),
            token: token.clone(),
            issued_at: now,
            expires_at: now + valid_for.as_millis() as u64,
            session_duration: valid_for,
            lifetime,
        };

        self.sessions.insert(token, session.clone());
        debug!(user_id, "session created");
        session
    }

    /// True iff the token exists and its short expiry has not passed.
    pub fn verify(&self, token: &str) -> bool {
        let now = self.clock.now_millis();
        self.sessions
            .get(token)
            .map(|session| now < session.expires_at)
            .unwrap_or(false)
    }

    /// Pushes a session's short expiry forward by its per-session duration.
    ///
    /// Returns `false` for unknown tokens. A session past its absolute
    /// lifetime is evicted here and `false` is returned; otherwise the new
    /// expiry is `now + session_duration` and the result is `true`.
    pub fn refresh(&self, token: &str) -> bool {
        let now = self.clock.now_millis();
        match self.sessions.entry(token.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().lifetime_exceeded(now) {
                    let session = occupied.remove();
                    warn!(user_id = %session.user_id, "session lifetime exceeded, evicted on refresh");
                    false
                } else {
                    let session = occupied.get_mut();
                    session.expires_at = now + session.session_duration.as_millis() as u64;
                    true
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    /// The user id behind a token, while the token verifies.
    ///
    /// Expired entries are not removed here; the sweeper (or a refresh
    /// attempt) handles eviction.
    pub fn get_user_id(&self, token: &str) -> Option<String> {
        let now = self.clock.now_millis();
        self.sessions.get(token).and_then(|session| {
            if now < session.expires_at {
                Some(session.user_id.clone())
            } else {
                None
            }
        })
    }

    /// Number of entries currently in the table, expired or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Stops the sweeper, waits for it, and drops every session.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .sweeper
            .lock()
            .expect("sweeper mutex poisoned")
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("session sweeper task failed: {e}");
            }
        }
        self.sessions.clear();
        info!("session manager shut down");
    }
}
