//! # tickfile
//!
//! An embedded storage engine for append-oriented, fixed-schema
//! time-series files.
//!
//! A tickfile container is a framed binary file whose body is a tightly
//! packed run of fixed-size records. Callers open a file, append records
//! whose index strictly advances, read ranges by index or ordinal, and
//! truncate the tail. Nothing else: no server, no query language, no
//! background threads.
//!
//! ## Key Features
//!
//! *   **Typed file binding:** every file persists a structural signature
//!     of its record layout; opening it with the wrong type fails before
//!     any record is interpreted.
//! *   **Two addressing models:** [`UniformSeriesFile`] addresses records
//!     by a fixed epoch and item span, so a timestamp maps to an ordinal
//!     by arithmetic; [`IndexedSeriesFile`] stores the index inside each
//!     record and binary-searches it.
//! *   **Zero-copy reads:** record bytes come straight out of a memory
//!     mapping when the `mmap` feature (default) is enabled.
//! *   **Streaming reads:** range reads yield windows through a reusable
//!     buffer pool, keeping memory bounded regardless of range size.
//! *   **Domain compression:** [`DeltaBlockSeries`] packs records into
//!     self-contained blocks of per-field deltas with exactness checks,
//!     tuned for slowly moving numeric series.
//!
//! ## Example
//!
//! ```no_run
//! use tickfile::{
//!     OpenMode, SeriesOptions, Timestamp, UniformSeriesFile,
//!     time::TICKS_PER_MINUTE,
//! };
//! # use tickfile::record::{FieldShape, Record, RecordDescriptor};
//! # #[derive(Clone, Copy, Default)]
//! # struct Bar { close: f64 }
//! # impl Record for Bar {
//! #     const SIZE: usize = 8;
//! #     fn descriptor() -> RecordDescriptor<Self> {
//! #         RecordDescriptor::new("demo::Bar").field(FieldShape::leaf("f64"))
//! #     }
//! #     fn write_to(&self, dst: &mut [u8]) { dst.copy_from_slice(&self.close.to_le_bytes()); }
//! #     fn read_from(src: &[u8]) -> Self {
//! #         let mut b = [0u8; 8];
//! #         b.copy_from_slice(src);
//! #         Self { close: f64::from_le_bytes(b) }
//! #     }
//! # }
//!
//! # fn main() -> tickfile::Result<()> {
//! let t0 = Timestamp::from_ticks(637_134_336_000_000_000);
//! let opts = SeriesOptions::new().tag("minute bars");
//! let mut series = UniformSeriesFile::<Bar>::create("bars.tf", t0, TICKS_PER_MINUTE, &opts)?;
//! series.append(t0, &[Bar { close: 1.1042 }])?;
//!
//! let mut stream = series.read(t0, t0.add_ticks(60 * TICKS_PER_MINUTE))?;
//! while let Some(window) = stream.next_chunk()? {
//!     for bar in window {
//!         // consume the window before asking for the next one
//!         let _ = bar.close;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! One writer, any number of readers, one handle per thread. A handle owns
//! its file descriptor and mapping exclusively; every operation takes
//! `&mut self`, so sharing requires external coordination by design. The
//! buffer pool is the only shared structure and its single cell is swapped
//! atomically.
//!
//! ## Safety and Error Handling
//!
//! * **Encapsulated unsafe:** the only `unsafe` in the crate is the
//!   memory-map acquisition in the engine.
//! * **No panics:** no `unwrap()` or `panic!()` in library code, enforced
//!   by clippy lints.
//! * **Comprehensive errors:** every failure surfaces as a
//!   [`TickfileError`]; nothing is silently recovered.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod api;
pub mod bitstream;
pub mod block;
pub mod buffer;
pub mod codec;
pub mod engine;
pub mod error;
pub mod format;
pub mod indexed;
pub mod inspector;
pub mod record;
pub mod serializer;
pub mod signature;
pub mod stream;
pub mod time;
pub mod uniform;

pub use api::SeriesOptions;
pub use block::DeltaBlockSeries;
pub use buffer::{BufferPool, GrowthSchedule};
pub use codec::{CodecKind, FieldCodec, FieldValue};
pub use engine::OpenMode;
pub use error::{Result, TickfileError};
pub use indexed::{IndexedSeriesFile, SearchOutcome};
pub use inspector::{inspect, SeriesReport};
pub use record::{IndexedRecord, Record, RecordDescriptor};
pub use signature::{TypeMap, TypeSignature};
pub use stream::SeriesStream;
pub use time::Timestamp;
pub use uniform::UniformSeriesFile;

/// Constants used throughout the library.
pub mod constants {
    /// Item capacity of the first windows of the default buffer schedule.
    pub const DEFAULT_INIT_SIZE: usize = 1024;

    /// Number of windows served at the initial size before growing.
    pub const DEFAULT_GROW_AFTER: usize = 4;

    /// Item capacity of the large windows of the default buffer schedule.
    pub const DEFAULT_LARGE_SIZE: usize = 16 * 1024;
}
