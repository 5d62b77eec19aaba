//! # Meridian Sessions
//!
//! Token-based user session management. Sessions are issued against a user
//! id, verified and refreshed by token, and bounded twice over: a short
//! per-session expiry that `refresh` can push forward, and an absolute
//! lifetime from issuance that nothing can extend.
//!
//! A background sweeper reaps lifetime-expired entries; entries whose short
//! expiry passed but whose lifetime remains are deliberately retained, since
//! a successful `refresh` revives them.
//!
//! Time is read through the injected [`Clock`] so every expiry rule is
//! testable with a manual clock.

pub use manager::{SessionConfig, SessionManager, UserSession};
pub use manager::{ADMIN_SESSION_TOKEN, ADMIN_USER_ID};

mod manager;
