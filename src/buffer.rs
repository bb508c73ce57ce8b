//! Reusable buffer pool and sizing schedules.
//!
//! A streaming read does not allocate a fresh buffer per window. Each pool
//! holds a single cached buffer cell; an iterator takes the cell when it
//! starts, grows it along a [`GrowthSchedule`] as the read progresses, and
//! restores it when it finishes or is abandoned. Taking the cell is an
//! atomic exchange, so two concurrent iterators never share a buffer; the
//! loser of the race simply allocates.
//!
//! The cached cell is a bounded reuse slot rather than a weakly held
//! allocation: there is no collector here that could clear a weak handle
//! under memory pressure, so the slot holds the buffer directly and
//! [`BufferPool::clear`] is the explicit pressure valve. Within one
//! iterator, yielded buffer capacities never decrease.

use std::sync::{Arc, Mutex};

/// How buffer sizes advance across the windows of one streaming read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthSchedule {
    /// `init_size` items for the first `grow_after` windows, then
    /// `large_size`.
    Growing {
        /// Item capacity of the early windows.
        init_size: usize,
        /// Number of windows served at `init_size`.
        grow_after: usize,
        /// Item capacity after the ramp.
        large_size: usize,
    },
    /// One fixed size for every window.
    Single {
        /// Item capacity of every window.
        size: usize,
    },
    /// An explicit ramp: `block_one`, `block_two`, then `small_size` for
    /// `grow_after` windows, then `large_size` from there on.
    Ramp {
        /// First window capacity.
        block_one: usize,
        /// Second window capacity.
        block_two: usize,
        /// Capacity of the following `grow_after` windows.
        small_size: usize,
        /// Number of windows served at `small_size`.
        grow_after: usize,
        /// Capacity of every later window.
        large_size: usize,
    },
}

impl GrowthSchedule {
    /// The default growing schedule used when no options are given.
    pub fn default_growing() -> Self {
        Self::Growing {
            init_size: crate::constants::DEFAULT_INIT_SIZE,
            grow_after: crate::constants::DEFAULT_GROW_AFTER,
            large_size: crate::constants::DEFAULT_LARGE_SIZE,
        }
    }

    /// Item capacity of the `step`-th window, counting from zero.
    pub fn size_at(&self, step: usize) -> usize {
        match *self {
            Self::Growing {
                init_size,
                grow_after,
                large_size,
            } => {
                if step < grow_after {
                    init_size
                } else {
                    large_size
                }
            }
            Self::Single { size } => size,
            Self::Ramp {
                block_one,
                block_two,
                small_size,
                grow_after,
                large_size,
            } => match step {
                0 => block_one,
                1 => block_two,
                s if s < 2 + grow_after => small_size,
                _ => large_size,
            },
        }
    }
}

/// A pool caching one buffer between streaming reads.
#[derive(Debug)]
pub struct BufferPool<T> {
    slot: Mutex<Option<Vec<T>>>,
}

impl<T> BufferPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Takes the cached buffer, or an empty one if the cache is cold or
    /// another iterator holds it.
    pub fn take(&self) -> Vec<T> {
        let mut guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        guard.take().unwrap_or_default()
    }

    /// Returns a buffer to the cache. The contents are cleared; the
    /// capacity is kept for the next taker.
    pub fn restore(&self, mut buf: Vec<T>) {
        buf.clear();
        let mut guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(buf);
    }

    /// Drops the cached buffer, releasing its memory.
    pub fn clear(&self) {
        let mut guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    /// Capacity of the cached buffer, if one is cached. Mostly useful to
    /// observe reuse in tests.
    pub fn cached_capacity(&self) -> Option<usize> {
        let guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().map(Vec::capacity)
    }
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a buffer taken from a pool and restores it on drop, whether the
/// stream finished or was abandoned mid-way.
#[derive(Debug)]
pub struct PoolGuard<T> {
    pool: Arc<BufferPool<T>>,
    buf: Option<Vec<T>>,
}

impl<T> PoolGuard<T> {
    /// Takes the pool's cached buffer into a guard.
    pub fn acquire(pool: Arc<BufferPool<T>>) -> Self {
        let buf = pool.take();
        Self {
            pool,
            buf: Some(buf),
        }
    }

    /// The held buffer.
    pub fn buffer_mut(&mut self) -> &mut Vec<T> {
        // The option is only vacated in drop.
        self.buf.get_or_insert_with(Vec::new)
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.restore(buf);
        }
    }
}
