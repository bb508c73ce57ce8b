//! Moves fixed-size record bytes between buffers and storage.
//!
//! Two paths exist, both endian-native and both free of any interpretation
//! of record content:
//!
//! - The **stream path** drives the host's read/write calls at the file's
//!   current position and accounts for every byte; a transfer the OS cuts
//!   short fails with [`TickfileError::ShortTransfer`] instead of being
//!   silently retried into an inconsistent state.
//! - The **mapped path** decodes records straight out of a memory-mapped
//!   range the engine hands over; the caller guarantees the mapping covers
//!   the range.

use std::io::{Read, Write};
use std::marker::PhantomData;

use crate::engine::SeriesCore;
use crate::error::{Result, TickfileError};
use crate::record::Record;

/// Reads exactly `buf.len()` bytes, failing with a short-transfer error if
/// the source dries up first.
pub(crate) fn read_exact_counted(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(TickfileError::ShortTransfer {
                    expected: buf.len(),
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Writes all of `buf`, failing with a short-transfer error if the sink
/// stops accepting bytes.
pub(crate) fn write_all_counted(writer: &mut impl Write, buf: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err(TickfileError::ShortTransfer {
                    expected: buf.len(),
                    actual: written,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Decodes a raw byte range into records. This is the mapped path's
/// interpretation step and the tail of the stream path.
pub fn decode_records<T: Record>(bytes: &[u8], out: &mut Vec<T>) -> Result<()> {
    if bytes.len() % T::SIZE != 0 {
        return Err(TickfileError::Format(format!(
            "byte range of {} is not a multiple of the record size {}",
            bytes.len(),
            T::SIZE
        )));
    }
    out.reserve(bytes.len() / T::SIZE);
    for chunk in bytes.chunks_exact(T::SIZE) {
        out.push(T::read_from(chunk));
    }
    Ok(())
}

/// Encodes records into a contiguous byte image.
pub fn encode_records<T: Record>(items: &[T], out: &mut Vec<u8>) {
    out.clear();
    out.resize(items.len() * T::SIZE, 0);
    for (item, chunk) in items.iter().zip(out.chunks_exact_mut(T::SIZE)) {
        item.write_to(chunk);
    }
}

/// Appends the serializer section of a subheader: the record size echoed
/// as an i32, then the encoded type signature.
pub(crate) fn build_serializer_section(
    record_size: u32,
    signature: &crate::signature::TypeSignature,
    out: &mut Vec<u8>,
) {
    out.extend_from_slice(&(record_size as i32).to_le_bytes());
    signature.encode(out);
}

/// Parses the serializer section back, validating the echoed record size
/// against the header.
pub(crate) fn parse_serializer_section(
    cursor: &mut crate::format::ByteCursor<'_>,
    record_size: u32,
) -> Result<crate::signature::TypeSignature> {
    let echo = cursor.read_i32()?;
    if echo != record_size as i32 {
        return Err(TickfileError::Format(format!(
            "subheader echoes record size {echo}, header says {record_size}"
        )));
    }
    crate::signature::TypeSignature::decode(cursor)
}

/// Typed front of the raw byte mover, bound to one record layout.
#[derive(Debug)]
pub struct RawSerializer<T: Record> {
    scratch: Vec<u8>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> RawSerializer<T> {
    /// Creates a serializer with an empty scratch image.
    pub fn new() -> Self {
        Self {
            scratch: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Reads `n` records starting at `first` into `out`, replacing its
    /// contents.
    pub fn read(
        &self,
        core: &mut SeriesCore,
        first: u64,
        n: u64,
        out: &mut Vec<T>,
    ) -> Result<()> {
        out.clear();
        if n == 0 {
            return Ok(());
        }
        let bytes = core.read_range(first, n)?;
        decode_records(bytes, out)
    }

    /// Writes `items` starting at ordinal `first`.
    pub fn write(&mut self, core: &mut SeriesCore, first: u64, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        encode_records(items, &mut self.scratch);
        core.write_range(first, &self.scratch)
    }
}

impl<T: Record> Default for RawSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}
