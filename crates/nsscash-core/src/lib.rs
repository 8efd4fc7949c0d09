//! # nsscash-core
//!
//! Binary account caches for NSS lookups: parsing of `/etc/passwd` and
//! `/etc/group` style text, serialization into a packed little-endian
//! cache format with three precomputed indices, and an mmap-backed reader
//! that answers lookups without allocating.
//!
//! The reader half of this crate runs inside arbitrary host processes (it
//! backs an NSS module), so the read path never panics on malformed input:
//! every multi-byte access is bounds-checked and decoded explicitly.

use thiserror::Error;

pub mod file;
pub mod format;
pub mod group;
pub mod passwd;
pub mod search;

/// Errors from parsing or serializing account databases.
#[derive(Debug, Error)]
pub enum Error {
    /// A line does not have the expected number of colon-separated fields.
    #[error("invalid line {0:?}")]
    InvalidLine(String),
    /// A uid/gid field is not an unsigned 64-bit decimal.
    #[error("invalid {field} in line {line:?}")]
    InvalidId { field: &'static str, line: String },
    /// The input does not end with a newline.
    #[error("no newline in last line: {0:?}")]
    MissingNewline(String),
    /// A record's variable-length data exceeds the u16 offset range.
    #[error("{db} too large to serialize: {size} bytes in record {name:?}")]
    TooLarge {
        db: &'static str,
        size: usize,
        name: String,
    },
    /// Internal consistency check failed while assembling the indices.
    #[error("indexes have inconsistent length")]
    IndexLength,
}

/// Lossy rendition of raw field bytes for error messages and logging.
pub(crate) fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
