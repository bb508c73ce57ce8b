//! Lazy windowed reads.
//!
//! A [`SeriesStream`] walks a resolved ordinal range window by window,
//! reading each window through the engine into a single pooled buffer and
//! lending it out. Memory stays bounded by the largest window regardless
//! of the range size; the consumer must be done with a window before
//! asking for the next one, because the buffer is reused in place.
//!
//! Dropping the stream anywhere, finished or not, restores the buffer to
//! its pool.

use std::sync::Arc;

use crate::buffer::{BufferPool, GrowthSchedule, PoolGuard};
use crate::engine::SeriesCore;
use crate::error::Result;
use crate::record::Record;
use crate::serializer::decode_records;

/// A lazy reader over `[first, first + len)` ordinals.
#[derive(Debug)]
pub struct SeriesStream<'a, T: Record> {
    core: &'a mut SeriesCore,
    guard: PoolGuard<T>,
    schedule: GrowthSchedule,
    next: u64,
    end: u64,
    step: usize,
}

impl<'a, T: Record> SeriesStream<'a, T> {
    pub(crate) fn new(
        core: &'a mut SeriesCore,
        pool: Arc<BufferPool<T>>,
        schedule: GrowthSchedule,
        first: u64,
        len: u64,
    ) -> Self {
        Self {
            core,
            guard: PoolGuard::acquire(pool),
            schedule,
            next: first,
            end: first.saturating_add(len),
            step: 0,
        }
    }

    /// Records not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }

    /// Reads the next window and lends it out, or returns `None` once the
    /// range is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<&[T]>> {
        if self.next >= self.end {
            return Ok(None);
        }
        let remaining = self.end - self.next;
        let want = (self.schedule.size_at(self.step) as u64)
            .min(remaining)
            .max(1);
        let bytes = self.core.read_range(self.next, want)?;
        let buf = self.guard.buffer_mut();
        buf.clear();
        decode_records(bytes, buf)?;
        self.next += want;
        self.step += 1;
        Ok(Some(buf.as_slice()))
    }

    /// Drains the whole range into one vector.
    pub fn read_all(mut self) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.remaining() as usize);
        while let Some(chunk) = self.next_chunk()? {
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }
}
