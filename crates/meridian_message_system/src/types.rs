//! Core identifier types shared across the server.

use serde::{Deserialize, Serialize};

/// Sentinel value carried by a connection before any handler has identified
/// the player behind it.
pub const UNDETERMINED_PLAYER_ID: &str = "[Undetermined]";

/// Identifier for a player in the game world.
///
/// Player ids are opaque account strings assigned by the embedding
/// application. A freshly accepted connection starts out with the
/// [`UNDETERMINED_PLAYER_ID`] sentinel and transitions to a real id exactly
/// once, when a handler calls `HandlerContext::update_player_id`.
///
/// # Examples
///
/// ```
/// use meridian_message_system::PlayerId;
///
/// let unknown = PlayerId::undetermined();
/// assert!(!unknown.is_determined());
///
/// let player = PlayerId::new("pid-1234");
/// assert!(player.is_determined());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    /// Creates a player id from an account string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the sentinel id used before identification.
    pub fn undetermined() -> Self {
        Self(UNDETERMINED_PLAYER_ID.to_string())
    }

    /// True once this id refers to a real player rather than the sentinel.
    pub fn is_determined(&self) -> bool {
        self.0 != UNDETERMINED_PLAYER_ID
    }

    /// The underlying account string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::undetermined()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
