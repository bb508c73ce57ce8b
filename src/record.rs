//! Record traits and caller-supplied type descriptors.
//!
//! A record is a fixed-size value with a stable byte layout. There is no
//! reflection in this engine: the caller describes the type once through a
//! [`RecordDescriptor`], and the descriptor drives everything the engine
//! needs to know about it (the persisted type name, the signature shape
//! that binds files to layouts, and the field codecs used by compressed
//! series).
//!
//! ```
//! use tickfile::codec::{CodecKind, FieldCodec, FieldValue};
//! use tickfile::record::{FieldShape, Record, RecordDescriptor};
//!
//! #[derive(Clone, Copy, Default)]
//! struct Sample {
//!     time: i64,
//!     value: f64,
//! }
//!
//! impl Record for Sample {
//!     const SIZE: usize = 16;
//!
//!     fn descriptor() -> RecordDescriptor<Self> {
//!         RecordDescriptor::new("demo::Sample")
//!             .field(FieldShape::leaf("i64"))
//!             .field(FieldShape::leaf("f64"))
//!             .codec(FieldCodec::new(
//!                 "time",
//!                 CodecKind::TimestampDelta,
//!                 |r| FieldValue::Int(r.time),
//!                 |r, v| {
//!                     if let FieldValue::Int(t) = v {
//!                         r.time = t;
//!                     }
//!                 },
//!             ))
//!     }
//!
//!     fn write_to(&self, dst: &mut [u8]) {
//!         dst[..8].copy_from_slice(&self.time.to_le_bytes());
//!         dst[8..16].copy_from_slice(&self.value.to_le_bytes());
//!     }
//!
//!     fn read_from(src: &[u8]) -> Self {
//!         let mut time = [0u8; 8];
//!         let mut value = [0u8; 8];
//!         time.copy_from_slice(&src[..8]);
//!         value.copy_from_slice(&src[8..16]);
//!         Self {
//!             time: i64::from_le_bytes(time),
//!             value: f64::from_le_bytes(value),
//!         }
//!     }
//! }
//! ```

use crate::codec::FieldCodec;

/// A fixed-size record with a stable, explicitly written byte layout.
///
/// Implementations write little-endian bytes by hand; [`Record::SIZE`] is
/// the packed layout size and may differ from `std::mem::size_of`.
pub trait Record: Copy + Send + Sync + 'static {
    /// The packed byte size of one record on disk.
    const SIZE: usize;

    /// Describes the type to the engine.
    fn descriptor() -> RecordDescriptor<Self>;

    /// Writes exactly [`Record::SIZE`] bytes into `dst`.
    fn write_to(&self, dst: &mut [u8]);

    /// Reads a record back out of exactly [`Record::SIZE`] bytes.
    fn read_from(src: &[u8]) -> Self;
}

/// A record carrying its own monotonic index field.
pub trait IndexedRecord: Record {
    /// The index type. Comparisons must be total for the values actually
    /// stored; a float index must not contain NaN.
    type Index: Copy + PartialOrd + std::fmt::Debug;

    /// Extracts the index field.
    fn series_index(&self) -> Self::Index;
}

/// One node of a record's signature shape: a primitive leaf or a nested
/// composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldShape {
    tag: String,
    children: Vec<FieldShape>,
}

impl FieldShape {
    /// A primitive field with a stable type tag.
    pub fn leaf(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            children: Vec::new(),
        }
    }

    /// A composite field opening a nested level.
    pub fn group(tag: impl Into<String>, children: Vec<FieldShape>) -> Self {
        Self {
            tag: tag.into(),
            children,
        }
    }

    /// The stable type tag of this node.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Child shapes of a composite; empty for a leaf.
    pub fn children(&self) -> &[FieldShape] {
        &self.children
    }
}

/// Everything the engine needs to know about a record type.
#[derive(Debug, Clone)]
pub struct RecordDescriptor<T> {
    type_name: String,
    fields: Vec<FieldShape>,
    codecs: Vec<FieldCodec<T>>,
}

impl<T> RecordDescriptor<T> {
    /// Starts a descriptor for the named type. The name is persisted in the
    /// header and doubles as the root signature tag.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            codecs: Vec::new(),
        }
    }

    /// Appends a field to the signature shape, in declaration order.
    pub fn field(mut self, shape: FieldShape) -> Self {
        self.fields.push(shape);
        self
    }

    /// Appends a field codec, in declaration order. Only compressed series
    /// consult these; plain files move raw record bytes.
    pub fn codec(mut self, codec: FieldCodec<T>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// The fully-qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The signature shape, field by field.
    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }

    /// The declared field codecs.
    pub fn codecs(&self) -> &[FieldCodec<T>] {
        &self.codecs
    }

    /// Consumes the descriptor, keeping only the codec list.
    pub fn into_codecs(self) -> Vec<FieldCodec<T>> {
        self.codecs
    }
}
