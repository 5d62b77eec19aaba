//! Time source abstraction.
//!
//! Session expiry and last-login bookkeeping both measure wall-clock time in
//! milliseconds since the Unix epoch. The [`Clock`] trait keeps that
//! measurement injectable so expiry logic can be tested without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since 1970-01-01 00:00:00 UTC.
    fn now_millis(&self) -> u64;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }
}

/// A manually driven clock for tests.
///
/// Starts at zero (or a chosen instant) and only moves when told to.
///
/// # Examples
///
/// ```
/// use meridian_message_system::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// assert_eq!(clock.now_millis(), 1_000);
/// clock.advance_millis(500);
/// assert_eq!(clock.now_millis(), 1_500);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at the given instant.
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Creates a shared clock handle frozen at the given instant.
    pub fn shared(start_millis: u64) -> Arc<Self> {
        Arc::new(Self::new(start_millis))
    }

    /// Moves the clock forward.
    pub fn advance_millis(&self, delta: u64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jumps the clock to an absolute instant.
    pub fn set_millis(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
