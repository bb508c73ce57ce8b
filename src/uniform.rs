//! Uniformly stepped time-series files.
//!
//! A uniform file does not store an index per record. Its subheader fixes
//! an epoch `T₀` and an item span `Δ`, and record `n` is implicitly the
//! value for `T₀ + n·Δ`. Timestamps and ordinals translate both ways by
//! plain arithmetic, which makes range reads a pair of divisions.
//!
//! Appends name the timestamp of their first record. Writing at the first
//! unavailable timestamp extends the series; writing earlier overwrites
//! the tail in place. Writing past the first unavailable timestamp would
//! leave a gap with no defined content and is refused.
//!
//! ## Version history
//!
//! - **1.0** persisted the epoch as an OS binary DateTime (tick count in
//!   the low 62 bits, kind marker above).
//! - **1.1** persists the epoch as a plain 64-bit tick count.
//!
//! Readers accept both; writers always emit 1.1.

use std::path::Path;
use std::sync::Arc;

use crate::api::SeriesOptions;
use crate::buffer::{BufferPool, GrowthSchedule};
use crate::engine::{OpenMode, SeriesCore};
use crate::error::{Result, TickfileError};
use crate::format::{ByteCursor, FileHeader};
use crate::record::Record;
use crate::serializer::{
    build_serializer_section, parse_serializer_section, RawSerializer,
};
use crate::signature::TypeSignature;
use crate::stream::SeriesStream;
use crate::time::{Timestamp, TICKS_PER_DAY};

/// A series file addressed by `(T₀, Δ)`.
#[derive(Debug)]
pub struct UniformSeriesFile<T: Record> {
    core: SeriesCore,
    serializer: RawSerializer<T>,
    pool: Arc<BufferPool<T>>,
    schedule: GrowthSchedule,
    epoch: Timestamp,
    span: i64,
}

impl<T: Record> UniformSeriesFile<T> {
    /// Creates a uniform series file with epoch `t0` and item span `span`
    /// ticks.
    ///
    /// The span must be positive, at most one day, and divide the day
    /// evenly; the epoch must sit on a span boundary.
    pub fn create(
        path: impl AsRef<Path>,
        t0: Timestamp,
        span: i64,
        options: &SeriesOptions,
    ) -> Result<Self> {
        validate_span(span)?;
        if t0.ticks() % span != 0 {
            return Err(TickfileError::IndexMisaligned(format!(
                "epoch {t0} is not on a {span}-tick boundary"
            )));
        }
        let descriptor = T::descriptor();
        let signature = TypeSignature::of::<T>();
        let mut subheader = Vec::new();
        build_serializer_section(T::SIZE as u32, &signature, &mut subheader);
        subheader.extend_from_slice(&span.to_le_bytes());
        subheader.extend_from_slice(&t0.ticks().to_le_bytes());

        let core = SeriesCore::create(
            path.as_ref(),
            T::SIZE as u32,
            options.tag_str(),
            descriptor.type_name(),
            &subheader,
        )?;
        Ok(Self {
            core,
            serializer: RawSerializer::new(),
            pool: Arc::new(BufferPool::new()),
            schedule: options.schedule(),
            epoch: t0,
            span,
        })
    }

    /// Opens an existing uniform series file, verifying the persisted
    /// signature against `T`.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, options: &SeriesOptions) -> Result<Self> {
        let (core, subheader) = SeriesCore::open(path.as_ref(), mode)?;
        if core.record_size() as usize != T::SIZE {
            return Err(TickfileError::RecordSizeChanged(format!(
                "file records are {} bytes, the in-memory layout is {}",
                core.record_size(),
                T::SIZE
            )));
        }
        let mut cursor = ByteCursor::new(&subheader);
        let persisted = parse_serializer_section(&mut cursor, core.record_size())?;
        persisted.verify(&TypeSignature::of::<T>(), options.map_ref())?;

        let span = cursor.read_i64()?;
        let raw_epoch = cursor.read_i64()?;
        let epoch = match core.header().version.minor {
            0 => Timestamp::from_binary_datetime(raw_epoch),
            _ => Timestamp::from_ticks(raw_epoch),
        };
        validate_span(span)
            .map_err(|_| TickfileError::Format(format!("persisted item span {span} is invalid")))?;
        Ok(Self {
            core,
            serializer: RawSerializer::new(),
            pool: Arc::new(BufferPool::new()),
            schedule: options.schedule(),
            epoch,
            span,
        })
    }

    /// The epoch `T₀`.
    pub fn first_timestamp(&self) -> Timestamp {
        self.epoch
    }

    /// The item span `Δ` in ticks.
    pub fn item_span(&self) -> i64 {
        self.span
    }

    /// The timestamp one past the last stored record.
    pub fn first_unavailable_timestamp(&self) -> Timestamp {
        self.epoch.add_ticks(self.core.count() as i64 * self.span)
    }

    /// Number of records stored.
    pub fn count(&self) -> u64 {
        self.core.count()
    }

    /// The parsed header.
    pub fn header(&self) -> &FileHeader {
        self.core.header()
    }

    /// Translates a timestamp to its ordinal. The timestamp must be on a
    /// span boundary and not precede the epoch.
    pub fn ordinal_of(&self, ts: Timestamp) -> Result<u64> {
        let diff = ts.ticks() - self.epoch.ticks();
        if diff < 0 {
            return Err(TickfileError::OutOfRange(format!(
                "timestamp {ts} precedes the epoch {}",
                self.epoch
            )));
        }
        if diff % self.span != 0 {
            return Err(TickfileError::IndexMisaligned(format!(
                "timestamp {ts} is not on a {}-tick boundary from the epoch",
                self.span
            )));
        }
        Ok((diff / self.span) as u64)
    }

    /// Translates an ordinal to its timestamp.
    pub fn timestamp_of(&self, ordinal: u64) -> Timestamp {
        self.epoch.add_ticks(ordinal as i64 * self.span)
    }

    /// Appends or overwrites records starting at timestamp `at`.
    ///
    /// `at` may point anywhere in `[T₀, firstUnavailable]`: the tail can
    /// be rewritten in place and writes running past the end extend the
    /// series. Starting past the first unavailable timestamp is refused;
    /// the engine does not invent gap records.
    pub fn append(&mut self, at: Timestamp, items: &[T]) -> Result<()> {
        let ordinal = self.ordinal_of(at)?;
        if ordinal > self.core.count() {
            return Err(TickfileError::OutOfRange(format!(
                "append at {at} would leave a gap after {}",
                self.first_unavailable_timestamp()
            )));
        }
        self.serializer.write(&mut self.core, ordinal, items)
    }

    /// Streams the records of `[from, to)`.
    ///
    /// Bounds are rounded up to span boundaries and clipped to the stored
    /// range; an empty or absurdly long clipped range yields no records.
    pub fn read(&mut self, from: Timestamp, to: Timestamp) -> Result<SeriesStream<'_, T>> {
        let (first, len) = self.adjust_range(from, to);
        Ok(SeriesStream::new(
            &mut self.core,
            Arc::clone(&self.pool),
            self.schedule,
            first,
            len,
        ))
    }

    /// Reads `n` records starting at ordinal `first` eagerly.
    pub fn read_ordinals(&mut self, first: u64, n: u64) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.serializer.read(&mut self.core, first, n, &mut out)?;
        Ok(out)
    }

    /// Truncates the series to `new_count` records.
    pub fn truncate_records(&mut self, new_count: u64) -> Result<()> {
        self.core.truncate(new_count)
    }

    /// Truncates so that `ts` becomes the first unavailable timestamp.
    pub fn truncate_before(&mut self, ts: Timestamp) -> Result<()> {
        let new_count = self.ordinal_of(ts)?;
        self.core.truncate(new_count)
    }

    /// Flushes and disposes the handle. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.core.close()
    }

    /// Resolves `[from, to)` to `(first ordinal, length)`.
    fn adjust_range(&self, from: Timestamp, to: Timestamp) -> (u64, u64) {
        let lo = self.ceil_align(from).max(self.epoch.ticks());
        let hi = self
            .ceil_align(to)
            .min(self.first_unavailable_timestamp().ticks());
        if hi <= lo {
            return (0, 0);
        }
        let first = ((lo - self.epoch.ticks()) / self.span) as u64;
        let len = ((hi - lo) / self.span) as u64;
        if len > i32::MAX as u64 {
            // The range is real but too long for one resolution; callers
            // must narrow it and stream.
            return (first, 0);
        }
        (first, len)
    }

    /// Rounds a timestamp up to the next span boundary.
    fn ceil_align(&self, ts: Timestamp) -> i64 {
        let diff = ts.ticks() - self.epoch.ticks();
        if diff <= 0 {
            return self.epoch.ticks();
        }
        let steps = (diff + self.span - 1) / self.span;
        self.epoch.ticks() + steps * self.span
    }
}

fn validate_span(span: i64) -> Result<()> {
    if span <= 0 {
        return Err(TickfileError::OutOfRange(format!(
            "item span {span} must be positive"
        )));
    }
    if span > TICKS_PER_DAY {
        return Err(TickfileError::OutOfRange(format!(
            "item span {span} exceeds one day"
        )));
    }
    if TICKS_PER_DAY % span != 0 {
        return Err(TickfileError::OutOfRange(format!(
            "item span {span} does not divide the day evenly"
        )));
    }
    Ok(())
}
