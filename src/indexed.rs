//! Indexed series files.
//!
//! Each record of an indexed file carries its own index field, and the
//! file guarantees the field never decreases across the body. Appends are
//! strict: new records go at the end, the batch must be internally
//! non-decreasing, and its first index must not fall below the last index
//! already stored. Equal indexes are allowed; runs of duplicates keep
//! their insertion order.
//!
//! Lookup is a lower-bound binary search over the ordinals, probing one
//! record per step. A hit reports the first ordinal carrying the index; a
//! miss reports the ordinal where the index would be inserted.

use std::path::Path;
use std::sync::Arc;

use crate::api::SeriesOptions;
use crate::buffer::{BufferPool, GrowthSchedule};
use crate::engine::{OpenMode, SeriesCore};
use crate::error::{Result, TickfileError};
use crate::format::{ByteCursor, FileHeader};
use crate::record::IndexedRecord;
use crate::serializer::{
    build_serializer_section, parse_serializer_section, RawSerializer,
};
use crate::signature::TypeSignature;
use crate::stream::SeriesStream;

/// The two outcomes of a binary search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The index is present; this is the smallest ordinal carrying it.
    Found(u64),
    /// The index is absent; inserting it would place it at this ordinal.
    Insertion(u64),
}

/// A series file whose records carry an embedded monotonic index.
#[derive(Debug)]
pub struct IndexedSeriesFile<T: IndexedRecord> {
    core: SeriesCore,
    serializer: RawSerializer<T>,
    pool: Arc<BufferPool<T>>,
    schedule: GrowthSchedule,
    probe: Vec<T>,
}

impl<T: IndexedRecord> IndexedSeriesFile<T> {
    /// Creates an empty indexed series file.
    pub fn create(path: impl AsRef<Path>, options: &SeriesOptions) -> Result<Self> {
        let descriptor = T::descriptor();
        let signature = TypeSignature::of::<T>();
        let mut subheader = Vec::new();
        build_serializer_section(T::SIZE as u32, &signature, &mut subheader);
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
            probe: Vec::with_capacity(1),
        })
    }

    /// Opens an existing indexed series file, verifying the persisted
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
        Ok(Self {
            core,
            serializer: RawSerializer::new(),
            pool: Arc::new(BufferPool::new()),
            schedule: options.schedule(),
            probe: Vec::with_capacity(1),
        })
    }

    /// Number of records stored.
    pub fn count(&self) -> u64 {
        self.core.count()
    }

    /// The parsed header.
    pub fn header(&self) -> &FileHeader {
        self.core.header()
    }

    /// The index of the last stored record, if any.
    pub fn last_index(&mut self) -> Result<Option<T::Index>> {
        let count = self.core.count();
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(self.read_one(count - 1)?.series_index()))
    }

    /// Appends records at the end of the series.
    ///
    /// The batch must be non-decreasing and must not start below the last
    /// stored index.
    pub fn append(&mut self, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        for pair in items.windows(2) {
            let (a, b) = (pair[0].series_index(), pair[1].series_index());
            if a > b {
                return Err(TickfileError::IndexNonMonotonic(format!(
                    "batch index {a:?} is followed by {b:?}"
                )));
            }
        }
        if let Some(last) = self.last_index()? {
            let first = items[0].series_index();
            if first < last {
                return Err(TickfileError::IndexNonMonotonic(format!(
                    "append starts at {first:?}, below the stored {last:?}"
                )));
            }
        }
        let count = self.core.count();
        self.serializer.write(&mut self.core, count, items)
    }

    /// Binary search for `index` over the whole file.
    pub fn search(&mut self, index: T::Index) -> Result<SearchOutcome> {
        let lo = self.lower_bound(index)?;
        if lo < self.core.count() {
            let found = self.read_one(lo)?.series_index();
            if found == index {
                return Ok(SearchOutcome::Found(lo));
            }
        }
        Ok(SearchOutcome::Insertion(lo))
    }

    /// Streams every record whose index falls in `[from, to)`.
    pub fn read_index_range(
        &mut self,
        from: T::Index,
        to: T::Index,
    ) -> Result<SeriesStream<'_, T>> {
        let lo = self.lower_bound(from)?;
        let hi = self.lower_bound(to)?;
        let len = hi.saturating_sub(lo);
        Ok(SeriesStream::new(
            &mut self.core,
            Arc::clone(&self.pool),
            self.schedule,
            lo,
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

    /// Flushes and disposes the handle. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.core.close()
    }

    /// Smallest ordinal whose index is not below `target`; `count` if all
    /// indexes are smaller.
    fn lower_bound(&mut self, target: T::Index) -> Result<u64> {
        let mut lo = 0u64;
        let mut hi = self.core.count();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.read_one(mid)?.series_index() < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn read_one(&mut self, ordinal: u64) -> Result<T> {
        self.serializer
            .read(&mut self.core, ordinal, 1, &mut self.probe)?;
        self.probe
            .first()
            .copied()
            .ok_or_else(|| TickfileError::OutOfRange(format!("no record at ordinal {ordinal}")))
    }
}
