/*!
 * Clock Types
 * Virtual time representation and clock errors
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Clock operation result
pub type ClockResult<T> = Result<T, ClockError>;

/// Clock region errors
#[derive(Error, Debug)]
pub enum ClockError {
    /// A region under the same identity survives from a prior run. Reported,
    /// never silently reused.
    #[error("clock region already exists: {0}")]
    AlreadyExists(String),

    #[error("clock region not found: {0}")]
    NotFound(String),

    #[error("clock region allocation failed: {0}")]
    AllocationFailed(String),

    #[error("clock region release failed: {0}")]
    ReleaseFailed(String),

    #[error("clock region corrupt: {0}")]
    Corrupt(&'static str),
}

/// Outcome of one coordinator tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Seconds exceeded the configured virtual-time ceiling
    CeilingReached,
}

/// A point on the simulated time axis.
///
/// Field order gives the derived `Ord` seconds-then-nanoseconds semantics.
/// Invariant: `nanos < NS_PER_SEC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VirtualTime {
    pub secs: u64,
    pub nanos: u32,
}

impl VirtualTime {
    pub const ZERO: Self = Self { secs: 0, nanos: 0 };

    pub fn new(secs: u64, nanos: u32) -> Self {
        debug_assert!((nanos as u64) < NS_PER_SEC);
        Self { secs, nanos }
    }

    /// Add a nanosecond duration, carrying into seconds on overflow.
    pub fn add_nanos(self, delta: u64) -> Self {
        let total = self.nanos as u64 + delta;
        Self {
            secs: self.secs + total / NS_PER_SEC,
            nanos: (total % NS_PER_SEC) as u32,
        }
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs, self.nanos)
    }
}
