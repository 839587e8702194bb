//! Time utilities and constants for FxWallet.

use chrono::{DateTime, Duration, Utc};

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Lifetime of an issued offer (3 minutes).
    pub fn offer_ttl() -> Duration {
        Duration::minutes(3)
    }

    /// How long expired offers are kept before the sweep removes them.
    pub fn offer_retention() -> Duration {
        Duration::minutes(10)
    }

    /// Interval of the offer sweep task.
    pub fn offer_sweep_interval() -> Duration {
        Duration::seconds(60)
    }

    /// Interval of the currency catalog refresh task.
    pub fn catalog_refresh_interval() -> Duration {
        Duration::hours(1)
    }
}

/// A timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Source of the current time. Injected so expiry logic can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct ManualClock {
    now: parking_lot::Mutex<Timestamp>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ManualClock {
    /// Start at the current wall clock time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Start at a fixed instant.
    pub fn at(now: Timestamp) -> Self {
        Self {
            now: parking_lot::Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Jump to an instant.
    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
