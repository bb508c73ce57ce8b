//! Composable per-field block codecs.
//!
//! A codec turns a run of records into a self-contained block:
//!
//! ```text
//! [var-u32 item count][bit-packed, field-interleaved values]
//! ```
//!
//! The first item of a block is written in full; every later item is a
//! per-field delta from its predecessor. Field values are mapped to
//! integers before encoding:
//!
//! - **Raw bits** write the value verbatim at a declared width.
//! - **Multiplied delta** maps `round(value · M / D)` and stores the
//!   running difference as a signed varint. A value the mapping cannot
//!   reconstruct exactly is refused with a precision-loss error before any
//!   state is emitted.
//! - **Timestamp delta** is the multiplied delta of a tick count with
//!   `M = 1`.
//!
//! A record's codec is the flat, declared-order list of its field codecs.
//! When the bit stream reports that a block is full the encoder closes the
//! block with the items that fit and reports how many were consumed; the
//! caller restarts with the residue. Decoding is strictly sequential
//! through [`BlockCursor`]: an initial value, then a producer for each
//! following item. There is no random access inside a block.

use crate::bitstream::{BitReader, BitWriter, StreamFull};
use crate::error::{Result, TickfileError};
use crate::format;

/// A field value in transit between a record and the codec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// An integer-valued field (including tick counts).
    Int(i64),
    /// A floating-point field.
    Float(f64),
}

/// How one field is mapped and encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Verbatim bits at a fixed width; no delta state.
    RawBits {
        /// Number of bits per value, at most 64.
        bits: u32,
    },
    /// Scaled integer deltas: values are mapped through `value · M / D`
    /// and must reconstruct exactly.
    MultipliedDelta {
        /// The multiplier M.
        multiplier: i64,
        /// The divisor D.
        divisor: i64,
    },
    /// Tick-count deltas; the multiplied delta with `M = 1`.
    TimestampDelta,
}

impl CodecKind {
    /// Wire tag persisted in subheaders.
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::RawBits { .. } => 0,
            Self::MultipliedDelta { .. } => 1,
            Self::TimestampDelta => 2,
        }
    }
}

/// One field of a record as the codec sees it: a name for diagnostics, an
/// encoding kind and a pair of accessors.
pub struct FieldCodec<T> {
    /// Field name, used in error messages and subheader validation.
    pub name: &'static str,
    /// How the field is encoded.
    pub kind: CodecKind,
    /// Reads the field out of a record.
    pub get: fn(&T) -> FieldValue,
    /// Writes a decoded value back into a record.
    ///
    /// A multiplied-delta value arrives as [`FieldValue::Int`] whenever the
    /// mapping divides back exactly, so setters for float fields must
    /// accept both variants and coerce.
    pub set: fn(&mut T, FieldValue),
}

impl<T> FieldCodec<T> {
    /// Creates a field codec.
    pub fn new(
        name: &'static str,
        kind: CodecKind,
        get: fn(&T) -> FieldValue,
        set: fn(&mut T, FieldValue),
    ) -> Self {
        Self { name, kind, get, set }
    }
}

impl<T> Clone for FieldCodec<T> {
    fn clone(&self) -> Self {
        Self { ..*self }
    }
}

impl<T> std::fmt::Debug for FieldCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCodec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Maps a field value to its integer wire form.
fn map_value<T>(field: &FieldCodec<T>, value: FieldValue) -> Result<i64> {
    match (field.kind, value) {
        (CodecKind::RawBits { bits }, FieldValue::Int(v)) => {
            let limit_ok = v >= 0 && (bits >= 64 || (v as u64) < (1u64 << bits));
            if !limit_ok {
                return Err(TickfileError::PrecisionLoss(format!(
                    "field `{}`: value {v} does not fit in {bits} raw bits",
                    field.name
                )));
            }
            Ok(v)
        }
        (CodecKind::MultipliedDelta { multiplier, divisor }, _)
            if multiplier == 0 || divisor == 0 =>
        {
            Err(TickfileError::StateInvalid(format!(
                "field `{}`: multiplier {multiplier} and divisor {divisor} must both be nonzero",
                field.name
            )))
        }
        (CodecKind::MultipliedDelta { multiplier, divisor }, FieldValue::Int(v)) => {
            let scaled = v.checked_mul(multiplier).ok_or_else(|| {
                TickfileError::PrecisionLoss(format!(
                    "field `{}`: {v} overflows under multiplier {multiplier}",
                    field.name
                ))
            })?;
            if scaled % divisor != 0 {
                return Err(TickfileError::PrecisionLoss(format!(
                    "field `{}`: {v} is not divisible under {multiplier}/{divisor}",
                    field.name
                )));
            }
            Ok(scaled / divisor)
        }
        (CodecKind::MultipliedDelta { multiplier, divisor }, FieldValue::Float(v)) => {
            let mapped_f = (v * multiplier as f64 / divisor as f64).round();
            if !mapped_f.is_finite()
                || mapped_f < i64::MIN as f64
                || mapped_f > i64::MAX as f64
            {
                return Err(TickfileError::PrecisionLoss(format!(
                    "field `{}`: {v} overflows under multiplier {multiplier}",
                    field.name
                )));
            }
            let mapped = mapped_f as i64;
            let recovered = mapped as f64 * divisor as f64 / multiplier as f64;
            if recovered != v {
                return Err(TickfileError::PrecisionLoss(format!(
                    "field `{}`: {v} does not survive multiplier {multiplier}/{divisor}",
                    field.name
                )));
            }
            Ok(mapped)
        }
        (CodecKind::TimestampDelta, FieldValue::Int(ticks)) => Ok(ticks),
        (kind, value) => Err(TickfileError::StateInvalid(format!(
            "field `{}`: accessor produced {value:?} for codec {kind:?}",
            field.name
        ))),
    }
}

/// Inverse of [`map_value`].
fn unmap_value<T>(field: &FieldCodec<T>, mapped: i64) -> Result<FieldValue> {
    match field.kind {
        CodecKind::RawBits { .. } | CodecKind::TimestampDelta => Ok(FieldValue::Int(mapped)),
        CodecKind::MultipliedDelta { multiplier, divisor } => {
            if multiplier == 0 || divisor == 0 {
                return Err(TickfileError::StateInvalid(format!(
                    "field `{}`: multiplier {multiplier} and divisor {divisor} must both be nonzero",
                    field.name
                )));
            }
            // Integer fields divide back exactly; float fields are
            // reconstructed by the setter from the same expression the
            // encoder verified.
            match mapped.checked_mul(divisor) {
                Some(scaled) if scaled % multiplier == 0 => {
                    Ok(FieldValue::Int(scaled / multiplier))
                }
                _ => Ok(FieldValue::Float(
                    mapped as f64 * divisor as f64 / multiplier as f64,
                )),
            }
        }
    }
}

/// Encodes runs of records into fixed-size blocks.
#[derive(Debug)]
pub struct BlockEncoder<T> {
    fields: Vec<FieldCodec<T>>,
    scratch: Vec<u8>,
    prev: Vec<i64>,
    staged: Vec<i64>,
}

impl<T> BlockEncoder<T> {
    /// Creates an encoder over a record's field codecs.
    pub fn new(fields: Vec<FieldCodec<T>>) -> Self {
        let n = fields.len();
        Self {
            fields,
            scratch: Vec::new(),
            prev: vec![0; n],
            staged: vec![0; n],
        }
    }

    /// The field codecs this encoder runs.
    pub fn fields(&self) -> &[FieldCodec<T>] {
        &self.fields
    }

    /// Encodes a prefix of `items` into `block` and returns how many items
    /// were consumed.
    ///
    /// Every block is self-contained: delta state resets at the block
    /// boundary and the first item is written in full. Unused block bytes
    /// are zeroed. Fails with [`TickfileError::OutOfRange`] when not even
    /// one item fits, and with [`TickfileError::PrecisionLoss`] before
    /// emitting anything if a value cannot be represented.
    pub fn encode_block(&mut self, items: &[T], block: &mut [u8]) -> Result<usize> {
        if self.fields.is_empty() {
            return Err(TickfileError::StateInvalid(
                "record descriptor declares no codec fields".into(),
            ));
        }
        if items.is_empty() {
            return Err(TickfileError::OutOfRange("no items to encode".into()));
        }

        self.scratch.clear();
        self.scratch.resize(block.len(), 0);
        let mut writer = BitWriter::new(&mut self.scratch);
        let mut item_starts: Vec<usize> = Vec::with_capacity(items.len());
        let mut consumed = 0usize;

        'items: for item in items {
            let start = writer.position();
            for (i, field) in self.fields.iter().enumerate() {
                let mapped = map_value(field, (field.get)(item))?;
                let wire = if consumed == 0 {
                    mapped
                } else {
                    mapped.wrapping_sub(self.prev[i])
                };
                let written: std::result::Result<(), StreamFull> = match field.kind {
                    CodecKind::RawBits { bits } => writer.write_bits(mapped as u64, bits),
                    _ => writer.write_signed_varint(wire),
                };
                if written.is_err() {
                    writer.rewind(start);
                    break 'items;
                }
                self.staged[i] = mapped;
            }
            self.prev.copy_from_slice(&self.staged);
            item_starts.push(start);
            consumed += 1;
        }

        // The count prefix must share the block with the payload. Popping
        // the last item shrinks both, so this converges.
        loop {
            if consumed == 0 {
                return Err(TickfileError::OutOfRange(format!(
                    "block of {} bytes cannot hold a single record",
                    block.len()
                )));
            }
            let payload_bytes = (writer.position() + 7) / 8;
            let mut prefix = Vec::with_capacity(5);
            format::write_var_u32(&mut prefix, consumed as u32);
            if prefix.len() + payload_bytes <= block.len() {
                let payload_bytes = {
                    let used = writer.finish();
                    debug_assert_eq!(used, payload_bytes);
                    used
                };
                block[..prefix.len()].copy_from_slice(&prefix);
                block[prefix.len()..prefix.len() + payload_bytes]
                    .copy_from_slice(&self.scratch[..payload_bytes]);
                block[prefix.len() + payload_bytes..].fill(0);
                return Ok(consumed);
            }
            consumed -= 1;
            writer.rewind(item_starts[consumed]);
        }
    }
}

/// Sequential decoder for one block: the initial item, then a producer for
/// each following item.
#[derive(Debug)]
pub struct BlockCursor<'d, 'b, T> {
    fields: &'d [FieldCodec<T>],
    reader: BitReader<'b>,
    remaining: u32,
    first: bool,
    prev: Vec<i64>,
}

impl<'d, 'b, T: Default> BlockCursor<'d, 'b, T> {
    /// Opens a block for decoding.
    pub fn new(fields: &'d [FieldCodec<T>], block: &'b [u8]) -> Result<Self> {
        let (count, used) = format::read_var_u32(block)?;
        let payload = block
            .get(used..)
            .ok_or_else(|| TickfileError::Format("block shorter than its count prefix".into()))?;
        Ok(Self {
            fields,
            reader: BitReader::new(payload),
            remaining: count,
            first: true,
            prev: vec![0; fields.len()],
        })
    }

    /// Items left in the block.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Produces the next item, or `None` once the block is exhausted.
    pub fn next_item(&mut self) -> Result<Option<T>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let mut item = T::default();
        for (i, field) in self.fields.iter().enumerate() {
            let mapped = match field.kind {
                CodecKind::RawBits { bits } => self.reader.read_bits(bits)? as i64,
                _ => {
                    let wire = self.reader.read_signed_varint()?;
                    if self.first {
                        wire
                    } else {
                        self.prev[i].wrapping_add(wire)
                    }
                }
            };
            self.prev[i] = mapped;
            (field.set)(&mut item, unmap_value(field, mapped)?);
        }
        self.first = false;
        self.remaining -= 1;
        Ok(Some(item))
    }
}

/// Decodes every item of `block` into `out`, returning the item count.
pub fn decode_block<T: Default>(
    fields: &[FieldCodec<T>],
    block: &[u8],
    out: &mut Vec<T>,
) -> Result<usize> {
    let mut cursor = BlockCursor::new(fields, block)?;
    let count = cursor.remaining() as usize;
    out.reserve(count);
    while let Some(item) = cursor.next_item()? {
        out.push(item);
    }
    Ok(count)
}
