//! Defines the physical binary layout of tickfile containers.
//!
//! This module specifies the on-disk representation of a series file,
//! including the fixed header prefix, the variable string framing and the
//! version scheme. Understanding this format is essential for implementing
//! readers in other languages or debugging file corruption.
//!
//! ## File Layout
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ Header prefix (16 bytes, fixed)  │
//! ├──────────────────────────────────┤
//! │ Tag (var-string)                 │
//! ├──────────────────────────────────┤
//! │ Record type name (var-string)    │
//! ├──────────────────────────────────┤
//! │ Subheader (serializer-specific)  │
//! ├──────────────────────────────────┤
//! │ Body: count × recordSize bytes   │
//! └──────────────────────────────────┘
//! ```
//!
//! ## Header Prefix
//!
//! ```text
//! Offset | Size | Field        | Description
//! -------|------|--------------|----------------------------------------
//! 0      | 4    | magic        | 0xBF71C80A (u32 LE)
//! 4      | 4    | headerLength | Total header bytes (i32 LE, ≥ 32)
//! 8      | 4    | recordSize   | Bytes per record (i32 LE, > 0)
//! 12     | 2    | versionMajor | i16 LE
//! 14     | 2    | versionMinor | i16 LE
//! ```
//!
//! Strings are framed as a 7-bit variable-length byte count followed by
//! UTF-8 bytes. The header length is fixed when the file is created and is
//! never rewritten; the body begins at `headerLength` and its size must be
//! a whole multiple of `recordSize` whenever the file is opened.
//!
//! ## Compatibility
//!
//! - **Endianness:** all multi-byte integers are little-endian.
//! - **Versioning:** the writer always emits [`FormatVersion::CURRENT`].
//!   Readers select legacy decoders by version; an unknown version is
//!   fatal.

use std::fmt;

use crate::error::{Result, TickfileError};

/// Magic value identifying a tickfile container.
pub const MAGIC: u32 = 0xBF71_C80A;

/// The minimum header length. Shorter natural headers are padded up.
pub const MIN_HEADER_LEN: u32 = 32;

/// Byte length of the fixed header prefix.
pub const FIXED_PREFIX_LEN: usize = 16;

/// Major/minor version of the file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    /// Breaking layout revision.
    pub major: i16,
    /// Backwards-readable revision within a major layout.
    pub minor: i16,
}

impl FormatVersion {
    /// The 1.0 layout. Uniform files persisted their epoch as an OS binary
    /// DateTime.
    pub const V1_0: Self = Self { major: 1, minor: 0 };

    /// The 1.1 layout. Uniform files persist their epoch as a 64-bit tick
    /// count.
    pub const V1_1: Self = Self { major: 1, minor: 1 };

    /// The version every writer emits.
    pub const CURRENT: Self = Self::V1_1;

    /// True if a reader of the current code base understands this version.
    pub fn is_supported(self) -> bool {
        self.major == 1 && (0..=Self::CURRENT.minor).contains(&self.minor)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The parsed header of an open series file.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Total header length in bytes; the body starts here.
    pub header_len: u32,
    /// Bytes per body record.
    pub record_size: u32,
    /// File layout version.
    pub version: FormatVersion,
    /// Free-form caller tag.
    pub tag: String,
    /// Fully-qualified name of the record type bound to the file.
    pub type_name: String,
}

impl FileHeader {
    /// Builds the complete header block for a new file.
    ///
    /// Returns the parsed header alongside its exact byte image. The
    /// header length is the natural length padded up to [`MIN_HEADER_LEN`]
    /// and is recorded at offset 4 of the image.
    pub fn build(
        record_size: u32,
        version: FormatVersion,
        tag: &str,
        type_name: &str,
        subheader: &[u8],
    ) -> Result<(Self, Vec<u8>)> {
        if record_size == 0 {
            return Err(TickfileError::Format("record size must be positive".into()));
        }
        let mut out = Vec::with_capacity(FIXED_PREFIX_LEN + 32 + subheader.len());
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes()); // header length, patched below
        out.extend_from_slice(&(record_size as i32).to_le_bytes());
        out.extend_from_slice(&version.major.to_le_bytes());
        out.extend_from_slice(&version.minor.to_le_bytes());
        write_var_string(&mut out, tag);
        write_var_string(&mut out, type_name);
        out.extend_from_slice(subheader);
        if out.len() < MIN_HEADER_LEN as usize {
            out.resize(MIN_HEADER_LEN as usize, 0);
        }
        let header_len = u32::try_from(out.len())
            .ok()
            .filter(|len| *len <= i32::MAX as u32)
            .ok_or_else(|| TickfileError::Format("header exceeds the i32 length field".into()))?;
        out[4..8].copy_from_slice(&(header_len as i32).to_le_bytes());

        let header = Self {
            header_len,
            record_size,
            version,
            tag: tag.to_owned(),
            type_name: type_name.to_owned(),
        };
        Ok((header, out))
    }

    /// Parses the fixed prefix, returning `(header_len, record_size,
    /// version)`.
    ///
    /// Only the magic and field ranges are validated here; version support
    /// is the caller's decision.
    pub fn parse_fixed(prefix: &[u8]) -> Result<(u32, u32, FormatVersion)> {
        let mut cursor = ByteCursor::new(prefix);
        let magic = cursor.read_u32()?;
        if magic != MAGIC {
            return Err(TickfileError::Format(format!(
                "invalid magic 0x{magic:08X}, expected 0x{MAGIC:08X}"
            )));
        }
        let header_len = cursor.read_i32()?;
        if header_len < MIN_HEADER_LEN as i32 {
            return Err(TickfileError::Format(format!(
                "header length {header_len} below the minimum of {MIN_HEADER_LEN}"
            )));
        }
        let record_size = cursor.read_i32()?;
        if record_size <= 0 {
            return Err(TickfileError::Format(format!(
                "record size {record_size} must be positive"
            )));
        }
        let major = cursor.read_i16()?;
        let minor = cursor.read_i16()?;
        Ok((
            header_len as u32,
            record_size as u32,
            FormatVersion { major, minor },
        ))
    }
}

/// Writes a 32-bit value in 7-bit groups, low group first, high bit as the
/// continuation flag.
pub fn write_var_u32(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Writes a length-prefixed UTF-8 string.
pub fn write_var_string(out: &mut Vec<u8>, s: &str) {
    write_var_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

/// Reads a var-u32 from the front of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn read_var_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    for (i, byte) in bytes.iter().enumerate() {
        if shift >= 35 {
            break;
        }
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(TickfileError::Format("unterminated varint".into()))
}

/// A bounds-checked little-endian reader over a byte slice.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Takes the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or_else(|| TickfileError::Format("unexpected end of header".into()))?;
        self.pos += n;
        Ok(slice)
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        bytes
            .try_into()
            .map(u32::from_le_bytes)
            .map_err(|_| TickfileError::Format("failed to read u32".into()))
    }

    /// Reads a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        bytes
            .try_into()
            .map(i32::from_le_bytes)
            .map_err(|_| TickfileError::Format("failed to read i32".into()))
    }

    /// Reads a little-endian i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.take(2)?;
        bytes
            .try_into()
            .map(i16::from_le_bytes)
            .map_err(|_| TickfileError::Format("failed to read i16".into()))
    }

    /// Reads a little-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        bytes
            .try_into()
            .map(i64::from_le_bytes)
            .map_err(|_| TickfileError::Format("failed to read i64".into()))
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.take(1)?;
        Ok(bytes[0])
    }

    /// Reads a 7-bit variable-length u32.
    pub fn read_var_u32(&mut self) -> Result<u32> {
        let (value, used) = read_var_u32(&self.buf[self.pos.min(self.buf.len())..])?;
        self.pos += used;
        Ok(value)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_var_string(&mut self) -> Result<String> {
        let len = self.read_var_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| TickfileError::Format("header string is not valid UTF-8".into()))
    }
}
