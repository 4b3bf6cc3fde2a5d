//! Time source abstraction.
//!
//! The transport makes every freshness decision against an injected
//! [`Clock`] so that expiry behavior can be exercised in tests without
//! waiting on wall time.

use chrono::{DateTime, Utc};

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock. This is the default used by
/// [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
