//! Time source for expiry checks.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Token freshness is always judged against this clock so tests can move
/// time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
