//! Centralized error handling for tickfile.
//!
//! Every failure condition in the engine is represented as a [`TickfileError`]
//! value and propagated through the [`Result`] type. The library never
//! panics; this is enforced with `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]` at the crate root.
//!
//! ## Error Categories
//!
//! - **I/O** ([`TickfileError::Io`]): low-level file system failures.
//! - **Framing** ([`TickfileError::Format`]): invalid magic, truncated
//!   headers, corrupt subheaders, undecodable blocks.
//! - **Contract violations**: signature mismatch, version incompatibility,
//!   record-size drift, misaligned or non-monotonic indexes.
//! - **Lifecycle**: truncate-grow, use after dispose, mutation of
//!   header-bound state after initialization.
//! - **Codec**: a value the multiplied-delta codec cannot represent without
//!   loss.
//!
//! A command-line front end maps these to process exit codes: usage and
//! range errors to 2, [`SignatureMismatch`](TickfileError::SignatureMismatch)
//! to 3, [`VersionIncompatible`](TickfileError::VersionIncompatible) to 4,
//! [`ShortTransfer`](TickfileError::ShortTransfer) to 5, the two index
//! errors to 6 and [`PrecisionLoss`](TickfileError::PrecisionLoss) to 7.
//!
//! The error type is `Clone` so that it can be stored or re-reported after
//! the fact; the wrapped `io::Error` sits behind an `Arc` for that reason.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for tickfile operations.
pub type Result<T> = std::result::Result<T, TickfileError>;

/// The master error enum covering all failure domains in tickfile.
#[derive(Debug, Clone)]
pub enum TickfileError {
    /// Low-level I/O failure (disk full, permissions, missing file).
    ///
    /// Wrapped in an `Arc` so the error stays `Clone`.
    Io(Arc<io::Error>),

    /// The file framing is invalid: wrong magic bytes, a truncated header,
    /// an out-of-bounds subheader, or an undecodable codec block.
    Format(String),

    /// The persisted type signature disagrees with the in-memory record
    /// layout, and no type map reconciled the difference.
    SignatureMismatch(String),

    /// The file carries a format version outside the supported set.
    VersionIncompatible(String),

    /// The body length is not a whole multiple of the record size, or the
    /// on-disk record size does not match the in-memory layout.
    ///
    /// A torn tail left by an interrupted append surfaces here on the next
    /// open; the residual bytes are reported and the file is refused.
    RecordSizeChanged(String),

    /// The OS transferred fewer bytes than requested.
    ShortTransfer {
        /// Bytes the operation required.
        expected: usize,
        /// Bytes actually moved before the transfer stopped.
        actual: usize,
    },

    /// A timestamp is not on an item-span boundary of a uniform file.
    IndexMisaligned(String),

    /// An append would break the non-decreasing index order of an indexed
    /// file.
    IndexNonMonotonic(String),

    /// A truncation target exceeds the current record count.
    TruncateGrow {
        /// Requested record count.
        requested: u64,
        /// Current record count.
        count: u64,
    },

    /// The multiplied-delta codec cannot represent a value exactly under
    /// the declared multiplier and divisor.
    PrecisionLoss(String),

    /// An operation was attempted on a closed handle.
    Disposed,

    /// A header-bound field was mutated after initialization, or an
    /// operation does not apply to the handle's current state (for
    /// example, writing through a read-only handle).
    StateInvalid(String),

    /// An argument is outside the valid range for the operation
    /// (ordinal out of bounds, append past the first unavailable
    /// timestamp, an impossible block size).
    OutOfRange(String),
}

impl fmt::Display for TickfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Format(s) => write!(f, "format error: {s}"),
            Self::SignatureMismatch(s) => write!(f, "type signature mismatch: {s}"),
            Self::VersionIncompatible(s) => write!(f, "incompatible file version: {s}"),
            Self::RecordSizeChanged(s) => write!(f, "record size changed: {s}"),
            Self::ShortTransfer { expected, actual } => {
                write!(f, "short transfer: expected {expected} bytes, moved {actual}")
            }
            Self::IndexMisaligned(s) => write!(f, "index misaligned: {s}"),
            Self::IndexNonMonotonic(s) => write!(f, "index non-monotonic: {s}"),
            Self::TruncateGrow { requested, count } => {
                write!(f, "cannot truncate {count} records up to {requested}")
            }
            Self::PrecisionLoss(s) => write!(f, "codec precision loss: {s}"),
            Self::Disposed => write!(f, "operation on a disposed handle"),
            Self::StateInvalid(s) => write!(f, "invalid state: {s}"),
            Self::OutOfRange(s) => write!(f, "out of range: {s}"),
        }
    }
}

impl std::error::Error for TickfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TickfileError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
