//! The common file engine: lifecycle, count invariants and ranged I/O.
//!
//! [`SeriesCore`] owns the OS resources of one open series file and is the
//! single authority over its layout invariants. The typed file kinds
//! (uniform, indexed, delta-block) wrap a core and add their addressing
//! model on top; the core itself only understands bytes and ordinals.
//!
//! ## Lifecycle
//!
//! ```text
//! Closed ──open/create──▶ Initialized ──(read|append|truncate)*──▶ Initialized
//!                              │                                       │
//!                              └────────────── close ─────────────────▶ Disposed
//! ```
//!
//! Close flushes OS buffers and releases the mapping; closing twice is a
//! no-op and every operation after close fails with
//! [`TickfileError::Disposed`]. Dropping an open writable core still
//! flushes, so a handle that goes out of scope on an error path does not
//! lose acknowledged appends.
//!
//! ## Count
//!
//! The record count is never stored. It is derived on open as
//! `(fileSize − headerLength) / recordSize`, and the division must be
//! exact: a residual tail (the footprint of an append interrupted between
//! extending the file and completing the transfer) is reported as
//! [`TickfileError::RecordSizeChanged`] and the file is refused until the
//! caller repairs it.
//!
//! ## Read paths
//!
//! Reads come out of a memory mapping when the `mmap` feature is enabled
//! (the default). Any mutation invalidates the mapping; it is rebuilt
//! lazily on the next read. Without the feature every read is a positioned
//! stream read into the core's scratch buffer.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[cfg(feature = "mmap")]
use memmap2::Mmap;
use tracing::{debug, trace};

use crate::error::{Result, TickfileError};
use crate::format::{FileHeader, FormatVersion, FIXED_PREFIX_LEN};
use crate::serializer::{read_exact_counted, write_all_counted};

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reads only; appends and truncation are refused.
    Read,
    /// Reads and writes.
    ReadWrite,
}

/// The open handle shared by every series kind.
#[derive(Debug)]
pub struct SeriesCore {
    file: File,
    path: PathBuf,
    header: FileHeader,
    count: u64,
    writable: bool,
    disposed: bool,
    scratch: Vec<u8>,
    #[cfg(feature = "mmap")]
    map: Option<Mmap>,
}

impl SeriesCore {
    /// Creates a new series file with a prepared header and an empty body.
    ///
    /// Fails if the path already exists; an existing file is never
    /// silently overwritten.
    pub fn create(
        path: &Path,
        record_size: u32,
        tag: &str,
        type_name: &str,
        subheader: &[u8],
    ) -> Result<Self> {
        let (header, image) =
            FileHeader::build(record_size, FormatVersion::CURRENT, tag, type_name, subheader)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        write_all_counted(&mut file, &image)?;
        debug!(
            path = %path.display(),
            record_size,
            header_len = header.header_len,
            "created series file"
        );
        Ok(Self {
            file,
            path: path.to_owned(),
            header,
            count: 0,
            writable: true,
            disposed: false,
            scratch: Vec::new(),
            #[cfg(feature = "mmap")]
            map: None,
        })
    }

    /// Opens an existing series file, validating the prefix and the body
    /// size invariant. Returns the handle together with the raw subheader
    /// bytes for the kind to interpret.
    pub fn open(path: &Path, mode: OpenMode) -> Result<(Self, Vec<u8>)> {
        let writable = mode == OpenMode::ReadWrite;
        let mut file = OpenOptions::new().read(true).write(writable).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < FIXED_PREFIX_LEN as u64 {
            return Err(TickfileError::Format(format!(
                "file of {file_len} bytes is smaller than the header prefix"
            )));
        }

        let mut prefix = [0u8; FIXED_PREFIX_LEN];
        read_exact_counted(&mut file, &mut prefix)?;
        let (header_len, record_size, version) = FileHeader::parse_fixed(&prefix)?;
        if !version.is_supported() {
            return Err(TickfileError::VersionIncompatible(format!(
                "file version {version}, supported up to {}",
                FormatVersion::CURRENT
            )));
        }
        if u64::from(header_len) > file_len {
            return Err(TickfileError::Format(format!(
                "header length {header_len} exceeds the file size {file_len}"
            )));
        }

        let mut rest = vec![0u8; header_len as usize - FIXED_PREFIX_LEN];
        read_exact_counted(&mut file, &mut rest)?;
        let mut cursor = crate::format::ByteCursor::new(&rest);
        let tag = cursor.read_var_string()?;
        let type_name = cursor.read_var_string()?;
        let subheader = rest[cursor.position()..].to_vec();

        let body = file_len - u64::from(header_len);
        let residue = body % u64::from(record_size);
        if residue != 0 {
            return Err(TickfileError::RecordSizeChanged(format!(
                "body of {body} bytes leaves {residue} residual bytes at record size {record_size}"
            )));
        }
        let count = body / u64::from(record_size);

        debug!(
            path = %path.display(),
            count,
            version = %version,
            writable,
            "opened series file"
        );
        let core = Self {
            file,
            path: path.to_owned(),
            header: FileHeader {
                header_len,
                record_size,
                version,
                tag,
                type_name,
            },
            count,
            writable,
            disposed: false,
            scratch: Vec::new(),
            #[cfg(feature = "mmap")]
            map: None,
        };
        Ok((core, subheader))
    }

    /// The parsed header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Bytes per record.
    pub fn record_size(&self) -> u32 {
        self.header.record_size
    }

    /// Number of whole records in the body.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The path the handle was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the handle has been closed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// True if the handle accepts writes.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed {
            return Err(TickfileError::Disposed);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.writable {
            return Err(TickfileError::StateInvalid(
                "handle was opened read-only".into(),
            ));
        }
        Ok(())
    }

    fn body_offset(&self, ordinal: u64) -> u64 {
        u64::from(self.header.header_len) + ordinal * u64::from(self.header.record_size)
    }

    #[cfg(feature = "mmap")]
    fn invalidate_map(&mut self) {
        self.map = None;
    }

    #[cfg(not(feature = "mmap"))]
    fn invalidate_map(&mut self) {}

    /// Reads `n` records starting at ordinal `first` and returns their raw
    /// bytes, valid until the next operation on the handle.
    pub fn read_range(&mut self, first: u64, n: u64) -> Result<&[u8]> {
        self.ensure_open()?;
        let end = first
            .checked_add(n)
            .ok_or_else(|| TickfileError::OutOfRange("ordinal range overflows".into()))?;
        if end > self.count {
            return Err(TickfileError::OutOfRange(format!(
                "records [{first}, {end}) requested from a file of {} records",
                self.count
            )));
        }
        let byte_len = (n * u64::from(self.header.record_size)) as usize;
        if byte_len == 0 {
            return Ok(&[]);
        }
        let offset = self.body_offset(first);

        #[cfg(feature = "mmap")]
        {
            if self.map.is_none() {
                #[allow(unsafe_code)]
                // The engine owns the only writer of this file; the mapping
                // is dropped before any mutation.
                let map = unsafe { Mmap::map(&self.file)? };
                self.map = Some(map);
            }
            if let Some(map) = self.map.as_ref() {
                let start = usize::try_from(offset).map_err(|_| {
                    TickfileError::OutOfRange("offset exceeds the address space".into())
                })?;
                return map
                    .get(start..start + byte_len)
                    .ok_or_else(|| TickfileError::Format("mapping does not cover the range".into()));
            }
        }

        self.scratch.resize(byte_len, 0);
        self.file.seek(SeekFrom::Start(offset))?;
        read_exact_counted(&mut self.file, &mut self.scratch)?;
        Ok(&self.scratch[..byte_len])
    }

    /// Writes whole records starting at ordinal `first`, which must not
    /// exceed the current count. Writing at `count` extends the file;
    /// writing below it overwrites in place, and the kind decides whether
    /// that is allowed.
    pub fn write_range(&mut self, first: u64, bytes: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        if bytes.is_empty() {
            return Ok(());
        }
        let record_size = u64::from(self.header.record_size);
        if bytes.len() as u64 % record_size != 0 {
            return Err(TickfileError::OutOfRange(format!(
                "write of {} bytes is not a multiple of the record size {record_size}",
                bytes.len()
            )));
        }
        if first > self.count {
            return Err(TickfileError::OutOfRange(format!(
                "write at ordinal {first} would leave a gap after {} records",
                self.count
            )));
        }
        self.invalidate_map();
        self.file.seek(SeekFrom::Start(self.body_offset(first)))?;
        write_all_counted(&mut self.file, bytes)?;
        let written = bytes.len() as u64 / record_size;
        self.count = self.count.max(first + written);
        trace!(first, written, count = self.count, "wrote record range");
        Ok(())
    }

    /// Shrinks the body to `new_count` records. Growing is refused; a
    /// repeated truncation to the same count is a no-op.
    pub fn truncate(&mut self, new_count: u64) -> Result<()> {
        self.ensure_writable()?;
        if new_count > self.count {
            return Err(TickfileError::TruncateGrow {
                requested: new_count,
                count: self.count,
            });
        }
        self.invalidate_map();
        self.file.set_len(self.body_offset(new_count))?;
        self.count = new_count;
        debug!(count = new_count, "truncated series file");
        Ok(())
    }

    /// Flushes OS buffers, releases the mapping and disposes the handle.
    /// Closing an already closed handle is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.invalidate_map();
        if self.writable {
            self.file.sync_all()?;
        }
        self.disposed = true;
        debug!(path = %self.path.display(), "closed series file");
        Ok(())
    }
}

impl Drop for SeriesCore {
    fn drop(&mut self) {
        if !self.disposed && self.writable {
            let _ = self.file.sync_all();
        }
    }
}
