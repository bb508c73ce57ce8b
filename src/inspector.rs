//! Structural inspection of series files.
//!
//! [`inspect`] reads only the header region and the file length, so it
//! works without knowing the record type. Useful for debugging files of
//! unknown provenance and for the front end's `info` command.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, TickfileError};
use crate::format::{ByteCursor, FileHeader, FIXED_PREFIX_LEN};
use crate::serializer::read_exact_counted;
use crate::signature::TypeSignature;

/// One signature entry as reported.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureEntryReport {
    /// Nesting depth.
    pub depth: u32,
    /// Type tag.
    pub tag: String,
}

/// A structural report of a series file.
#[derive(Debug, Serialize)]
pub struct SeriesReport {
    /// Total size of the file on disk.
    pub file_size: u64,
    /// Header length; the body starts here.
    pub header_len: u32,
    /// Bytes per record.
    pub record_size: u32,
    /// Format version, rendered as `major.minor`.
    pub version: String,
    /// Caller tag.
    pub tag: String,
    /// Persisted record type name.
    pub type_name: String,
    /// Whole records in the body.
    pub count: u64,
    /// Bytes left over after the last whole record. Non-zero means a torn
    /// tail that a typed open would refuse.
    pub body_residue: u64,
    /// The persisted type signature, if the subheader carries one.
    pub signature: Vec<SignatureEntryReport>,
}

/// Reads the structure of the file at `path` without a typed open.
pub fn inspect(path: impl AsRef<Path>) -> Result<SeriesReport> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();
    if file_size < FIXED_PREFIX_LEN as u64 {
        return Err(TickfileError::Format(format!(
            "file of {file_size} bytes is smaller than the header prefix"
        )));
    }
    let mut prefix = [0u8; FIXED_PREFIX_LEN];
    read_exact_counted(&mut file, &mut prefix)?;
    let (header_len, record_size, version) = FileHeader::parse_fixed(&prefix)?;
    if u64::from(header_len) > file_size {
        return Err(TickfileError::Format(format!(
            "header length {header_len} exceeds the file size {file_size}"
        )));
    }
    let mut rest = vec![0u8; header_len as usize - FIXED_PREFIX_LEN];
    read_exact_counted(&mut file, &mut rest)?;
    let mut cursor = ByteCursor::new(&rest);
    let tag = cursor.read_var_string()?;
    let type_name = cursor.read_var_string()?;

    // Every built-in kind leads the subheader with a record-size echo and
    // the signature; tolerate files that do not.
    let signature = read_signature(&mut cursor, record_size).unwrap_or_default();

    let body = file_size - u64::from(header_len);
    Ok(SeriesReport {
        file_size,
        header_len,
        record_size,
        version: version.to_string(),
        tag,
        type_name,
        count: body / u64::from(record_size),
        body_residue: body % u64::from(record_size),
        signature,
    })
}

fn read_signature(
    cursor: &mut ByteCursor<'_>,
    record_size: u32,
) -> Option<Vec<SignatureEntryReport>> {
    let echo = cursor.read_i32().ok()?;
    if echo != record_size as i32 {
        return None;
    }
    let signature = TypeSignature::decode(cursor).ok()?;
    Some(
        signature
            .entries()
            .iter()
            .map(|entry| SignatureEntryReport {
                depth: entry.depth,
                tag: entry.tag.clone(),
            })
            .collect(),
    )
}
