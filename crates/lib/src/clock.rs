//! Time provider abstraction
//!
//! Challenge expiry, access timestamps and audit events all read time through
//! the [`Clock`] trait so that production code runs on a monotonic clock while
//! tests drive time explicitly.
//!
//! # Example
//!
//! ```
//! use telegate::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(1_000);
//! assert_eq!(clock.now_millis(), 1_000);
//! clock.advance(250);
//! assert_eq!(clock.now_millis(), 1_250);
//! ```

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};

/// A source of millisecond timestamps.
///
/// Implementations must never go backwards: expiry checks compare values
/// taken at different points of a handshake.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;

    /// Returns the current time as an RFC3339-formatted string.
    fn now_rfc3339(&self) -> String {
        format_millis(self.now_millis())
    }
}

/// Format a millisecond timestamp as RFC3339.
pub fn format_millis(millis: u64) -> String {
    let secs = (millis / 1000) as i64;
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string())
}

/// Production clock.
///
/// Anchors to wall-clock time once at construction and advances with
/// [`Instant`], so readings are wall-aligned but immune to system clock
/// adjustments.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor_millis: u64,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let anchor_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            anchor_millis,
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.anchor_millis + self.anchor.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
///
/// Used by tests and simulations that need to step past challenge expiry or
/// rotation grace windows deterministically. Shared between components via
/// `Arc<ManualClock>`.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at the given time in milliseconds.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    /// Move the clock forward to `ms`. Earlier values are ignored.
    pub fn set(&self, ms: u64) {
        self.millis.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1_704_067_200_000)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
