//! Delta-block compressed series files.
//!
//! A delta-block series stores codec output instead of raw records: the
//! on-disk "record" is a fixed-size block holding a var-length item count
//! and the bit-packed field deltas of as many records as fit. Every block
//! decodes independently, and because the first item of a block is written
//! in full, the starting index of any block can be recovered by decoding a
//! single item.
//!
//! The subheader echoes the block size, the record signature, and the
//! per-field codec parameters; opening a file with a descriptor whose
//! codecs disagree with what was persisted is refused before any data is
//! touched.
//!
//! Reads are sequential within a block (there is no random access inside
//! one), so positioned reads binary-search the block starts and then
//! decode forward.

use std::path::Path;

use tracing::debug;

use crate::api::SeriesOptions;
use crate::codec::{decode_block, BlockCursor, BlockEncoder, CodecKind, FieldCodec};
use crate::engine::{OpenMode, SeriesCore};
use crate::error::{Result, TickfileError};
use crate::format::{ByteCursor, FileHeader};
use crate::record::IndexedRecord;
use crate::serializer::{build_serializer_section, parse_serializer_section};
use crate::signature::TypeSignature;

/// The smallest accepted block size.
pub const MIN_BLOCK_SIZE: u32 = 16;

/// A series file storing delta-compressed blocks of records.
#[derive(Debug)]
pub struct DeltaBlockSeries<T: IndexedRecord + Default> {
    core: SeriesCore,
    fields: Vec<FieldCodec<T>>,
    encoder: BlockEncoder<T>,
    block: Vec<u8>,
}

impl<T: IndexedRecord + Default> DeltaBlockSeries<T> {
    /// Creates a delta-block series with the given block size in bytes.
    pub fn create(
        path: impl AsRef<Path>,
        block_size: u32,
        options: &SeriesOptions,
    ) -> Result<Self> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(TickfileError::OutOfRange(format!(
                "block size {block_size} below the minimum of {MIN_BLOCK_SIZE}"
            )));
        }
        let descriptor = T::descriptor();
        if descriptor.codecs().is_empty() {
            return Err(TickfileError::StateInvalid(format!(
                "descriptor of {} declares no codec fields",
                descriptor.type_name()
            )));
        }
        let signature = TypeSignature::of::<T>();
        let mut subheader = Vec::new();
        build_serializer_section(block_size, &signature, &mut subheader);
        encode_codec_params(descriptor.codecs(), &mut subheader);

        let core = SeriesCore::create(
            path.as_ref(),
            block_size,
            options.tag_str(),
            descriptor.type_name(),
            &subheader,
        )?;
        let fields = descriptor.into_codecs();
        debug!(block_size, fields = fields.len(), "created delta-block series");
        Ok(Self {
            core,
            encoder: BlockEncoder::new(fields.clone()),
            fields,
            block: vec![0; block_size as usize],
        })
    }

    /// Opens an existing delta-block series, verifying the signature and
    /// the persisted codec parameters against `T`.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, options: &SeriesOptions) -> Result<Self> {
        let (core, subheader) = SeriesCore::open(path.as_ref(), mode)?;
        let block_size = core.record_size();
        let mut cursor = ByteCursor::new(&subheader);
        let persisted = parse_serializer_section(&mut cursor, block_size)?;
        persisted.verify(&TypeSignature::of::<T>(), options.map_ref())?;

        let descriptor = T::descriptor();
        verify_codec_params(&mut cursor, descriptor.codecs())?;
        let fields = descriptor.into_codecs();
        Ok(Self {
            core,
            encoder: BlockEncoder::new(fields.clone()),
            fields,
            block: vec![0; block_size as usize],
        })
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> u64 {
        self.core.count()
    }

    /// The parsed header.
    pub fn header(&self) -> &FileHeader {
        self.core.header()
    }

    /// Appends records, packing them into as many new blocks as needed.
    ///
    /// The batch must be non-decreasing and must not start below the last
    /// stored index. Blocks are never reopened; a short batch simply
    /// leaves its last block underfull. The whole batch is encoded before
    /// anything is written, so an encode failure anywhere in the batch
    /// leaves the file unchanged.
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
        if let Some(last) = self.last_stored_index()? {
            let first = items[0].series_index();
            if first < last {
                return Err(TickfileError::IndexNonMonotonic(format!(
                    "append starts at {first:?}, below the stored {last:?}"
                )));
            }
        }

        let mut staged = Vec::new();
        let mut done = 0;
        while done < items.len() {
            let consumed = self.encoder.encode_block(&items[done..], &mut self.block)?;
            staged.extend_from_slice(&self.block);
            done += consumed;
        }
        let at = self.core.count();
        self.core.write_range(at, &staged)
    }

    /// Streams the whole series block by block.
    pub fn stream_all(&mut self) -> BlockStream<'_, T> {
        BlockStream {
            series: self,
            next: 0,
            items: Vec::new(),
        }
    }

    /// Reads every record whose index is at least `from`.
    ///
    /// Binary-searches the block starts, then decodes forward.
    pub fn read_from(&mut self, from: T::Index) -> Result<Vec<T>> {
        let blocks = self.core.count();
        // Lower bound over first-item indexes: the first block that starts
        // at or after `from`.
        let mut lo = 0u64;
        let mut hi = blocks;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.first_index_of(mid)? < from {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        // The match may begin inside the preceding block.
        let start = lo.saturating_sub(1);

        let mut out = Vec::new();
        let mut scratch = Vec::new();
        for block in start..blocks {
            let bytes = self.core.read_range(block, 1)?;
            scratch.clear();
            decode_block(&self.fields, bytes, &mut scratch)?;
            for item in &scratch {
                if item.series_index() >= from {
                    out.push(*item);
                }
            }
        }
        Ok(out)
    }

    /// Truncates the series to `new_count` blocks.
    pub fn truncate_blocks(&mut self, new_count: u64) -> Result<()> {
        self.core.truncate(new_count)
    }

    /// Flushes and disposes the handle. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.core.close()
    }

    fn first_index_of(&mut self, block: u64) -> Result<T::Index> {
        let bytes = self.core.read_range(block, 1)?;
        let mut cursor = BlockCursor::new(&self.fields, bytes)?;
        let first = cursor.next_item()?.ok_or_else(|| {
            TickfileError::Format(format!("block {block} holds no records"))
        })?;
        Ok(first.series_index())
    }

    fn last_stored_index(&mut self) -> Result<Option<T::Index>> {
        let blocks = self.core.count();
        if blocks == 0 {
            return Ok(None);
        }
        let bytes = self.core.read_range(blocks - 1, 1)?;
        let mut cursor = BlockCursor::new(&self.fields, bytes)?;
        let mut last = None;
        while let Some(item) = cursor.next_item()? {
            last = Some(item.series_index());
        }
        Ok(last)
    }
}

/// Lends out the decoded records of one block at a time.
#[derive(Debug)]
pub struct BlockStream<'a, T: IndexedRecord + Default> {
    series: &'a mut DeltaBlockSeries<T>,
    next: u64,
    items: Vec<T>,
}

impl<'a, T: IndexedRecord + Default> BlockStream<'a, T> {
    /// Decodes and lends the next block, or `None` past the last one.
    pub fn next_block(&mut self) -> Result<Option<&[T]>> {
        let series = &mut *self.series;
        if self.next >= series.core.count() {
            return Ok(None);
        }
        let bytes = series.core.read_range(self.next, 1)?;
        self.items.clear();
        decode_block(&series.fields, bytes, &mut self.items)?;
        self.next += 1;
        Ok(Some(self.items.as_slice()))
    }

    /// Drains every remaining block into one vector.
    pub fn read_all(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_block()? {
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }
}

fn encode_codec_params<T>(fields: &[FieldCodec<T>], out: &mut Vec<u8>) {
    out.extend_from_slice(&(fields.len() as i32).to_le_bytes());
    for field in fields {
        out.push(field.kind.tag());
        match field.kind {
            CodecKind::RawBits { bits } => out.extend_from_slice(&bits.to_le_bytes()),
            CodecKind::MultipliedDelta { multiplier, divisor } => {
                out.extend_from_slice(&multiplier.to_le_bytes());
                out.extend_from_slice(&divisor.to_le_bytes());
            }
            CodecKind::TimestampDelta => {}
        }
    }
}

fn verify_codec_params<T>(cursor: &mut ByteCursor<'_>, fields: &[FieldCodec<T>]) -> Result<()> {
    let count = cursor.read_i32()?;
    if count as usize != fields.len() {
        return Err(TickfileError::Format(format!(
            "file declares {count} codec fields, the descriptor has {}",
            fields.len()
        )));
    }
    for field in fields {
        let tag = cursor.read_u8()?;
        if tag != field.kind.tag() {
            return Err(TickfileError::Format(format!(
                "codec kind of field `{}` changed since the file was written",
                field.name
            )));
        }
        match field.kind {
            CodecKind::RawBits { bits } => {
                let stored = cursor.read_u32()?;
                if stored != bits {
                    return Err(TickfileError::Format(format!(
                        "field `{}` was written with {stored} raw bits, descriptor says {bits}",
                        field.name
                    )));
                }
            }
            CodecKind::MultipliedDelta { multiplier, divisor } => {
                let (m, d) = (cursor.read_i64()?, cursor.read_i64()?);
                if (m, d) != (multiplier, divisor) {
                    return Err(TickfileError::Format(format!(
                        "field `{}` was written with multiplier {m}/{d}, descriptor says {multiplier}/{divisor}",
                        field.name
                    )));
                }
            }
            CodecKind::TimestampDelta => {}
        }
    }
    Ok(())
}
