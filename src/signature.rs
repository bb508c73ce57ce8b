//! Structural type signatures.
//!
//! A signature is the depth-first walk of a record's shape flattened into
//! `(depth, tag)` pairs: the record type itself at depth 0, its fields at
//! depth 1, nested composites one level deeper. The signature is persisted
//! in the serializer subheader when a file is created and re-checked on
//! every open; two signatures are equal exactly when their entry sequences
//! match element-wise.
//!
//! A mismatch is fatal unless the caller supplies a [`TypeMap`] whose
//! renames reconcile the persisted tags with the in-memory ones (the
//! escape hatch for types that moved or were renamed between writes).

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TickfileError};
use crate::format::{self, ByteCursor};
use crate::record::{FieldShape, Record};

/// One `(depth, tag)` element of a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    /// Nesting depth; the record type is 0, its direct fields 1.
    pub depth: u32,
    /// Stable type tag.
    pub tag: String,
}

/// The structural fingerprint of a record layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSignature {
    entries: Vec<SignatureEntry>,
}

impl TypeSignature {
    /// Builds the signature of a record type from its descriptor.
    pub fn of<T: Record>() -> Self {
        let descriptor = T::descriptor();
        let mut entries = vec![SignatureEntry {
            depth: 0,
            tag: descriptor.type_name().to_owned(),
        }];
        for field in descriptor.fields() {
            push_shape(&mut entries, field, 1);
        }
        Self { entries }
    }

    /// Builds a signature from raw entries. Used by tests and tools that
    /// frame files by hand.
    pub fn from_entries(entries: Vec<SignatureEntry>) -> Self {
        Self { entries }
    }

    /// The flattened entries.
    pub fn entries(&self) -> &[SignatureEntry] {
        &self.entries
    }

    /// Appends the wire form: an i32 entry count, then per entry an i32
    /// depth and a var-length tag string.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as i32).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&(entry.depth as i32).to_le_bytes());
            format::write_var_string(out, &entry.tag);
        }
    }

    /// Reads the wire form back.
    pub fn decode(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let count = cursor.read_i32()?;
        if count < 0 {
            return Err(TickfileError::Format(format!(
                "negative signature length {count}"
            )));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let depth = cursor.read_i32()?;
            if depth < 0 {
                return Err(TickfileError::Format(format!(
                    "negative signature depth {depth}"
                )));
            }
            let tag = cursor.read_var_string()?;
            entries.push(SignatureEntry {
                depth: depth as u32,
                tag,
            });
        }
        Ok(Self { entries })
    }

    /// Returns a copy with every tag passed through the map's renames.
    pub fn remapped(&self, map: &TypeMap) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|entry| SignatureEntry {
                depth: entry.depth,
                tag: map.resolve(&entry.tag).to_owned(),
            })
            .collect();
        Self { entries }
    }

    /// Checks a persisted signature against the expected one, applying the
    /// optional type map before giving up.
    pub fn verify(&self, expected: &Self, map: Option<&TypeMap>) -> Result<()> {
        if self == expected {
            return Ok(());
        }
        if let Some(map) = map {
            if &self.remapped(map) == expected {
                return Ok(());
            }
        }
        Err(TickfileError::SignatureMismatch(format!(
            "file has {self}, expected {expected}"
        )))
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", entry.depth, entry.tag)?;
        }
        write!(f, "]")
    }
}

fn push_shape(entries: &mut Vec<SignatureEntry>, shape: &FieldShape, depth: u32) {
    entries.push(SignatureEntry {
        depth,
        tag: shape.tag().to_owned(),
    });
    for child in shape.children() {
        push_shape(entries, child, depth + 1);
    }
}

/// Caller-supplied tag renames that authorize opening a file whose
/// persisted signature uses older names.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    renames: HashMap<String, String>,
}

impl TypeMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rename from the persisted tag to the current one.
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.insert(from.into(), to.into());
        self
    }

    /// Resolves a persisted tag to its current name.
    pub fn resolve<'a>(&'a self, tag: &'a str) -> &'a str {
        self.renames.get(tag).map(String::as_str).unwrap_or(tag)
    }
}
