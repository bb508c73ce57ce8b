//! Tick-based timestamps.
//!
//! All time values in tickfile are counts of 100 nanosecond ticks since
//! 0001-01-01T00:00:00. Uniform files persist their epoch and item span in
//! this unit, and the timestamp codec encodes tick deltas directly.

use std::fmt;

/// Ticks per second (one tick is 100 ns).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks per minute.
pub const TICKS_PER_MINUTE: i64 = 60 * TICKS_PER_SECOND;

/// Ticks per day.
pub const TICKS_PER_DAY: i64 = 24 * 60 * TICKS_PER_MINUTE;

/// The legacy 1.0 layout stored the epoch through an OS binary DateTime
/// whose top two bits carry a kind marker; the tick count lives in the low
/// 62 bits.
const BINARY_TICKS_MASK: i64 = 0x3FFF_FFFF_FFFF_FFFF;

/// A point in time expressed as ticks since 0001-01-01T00:00:00.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from a raw tick count.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Decodes the legacy binary DateTime representation used by 1.0 files.
    pub const fn from_binary_datetime(bits: i64) -> Self {
        Self(bits & BINARY_TICKS_MASK)
    }

    /// Returns the raw tick count.
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by `ticks`.
    pub const fn add_ticks(self, ticks: i64) -> Self {
        Self(self.0 + ticks)
    }

    /// True if this timestamp sits on a `span`-tick boundary relative to
    /// `epoch`.
    pub const fn is_aligned(self, epoch: Timestamp, span: i64) -> bool {
        (self.0 - epoch.0) % span == 0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({} ticks)", self.0)
    }
}

/// Display is the raw tick count; rendering calendar dates is left to the
/// front end.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
