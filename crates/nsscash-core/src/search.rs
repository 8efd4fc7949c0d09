//! Binary search over the precomputed cache indices.
//!
//! The comparison key lives at a fixed position inside every record:
//! offset 0 for the numeric id (uid/gid lead their record) and the record
//! header size for the name (the name is the first string in `data`).
//! Which one applies is carried by [`SearchKey`]; a tagged variant keeps
//! the hot path free of indirect calls.

use std::cmp::Ordering;

use crate::file::{CacheFile, IndexKind};
use crate::format;

/// What to search for, and where the key lives inside a record.
#[derive(Debug, Clone, Copy)]
pub enum SearchKey<'a> {
    /// Match the leading u64 id field.
    Id(u64),
    /// Match the NUL-terminated name at `key_offset`, byte-wise.
    Name(&'a [u8]),
}

impl SearchKey<'_> {
    /// The index region this key is searched in.
    pub fn index_kind(&self) -> IndexKind {
        match self {
            SearchKey::Id(_) => IndexKind::Id,
            SearchKey::Name(_) => IndexKind::Name,
        }
    }
}

/// Binary search `file`'s matching index for `key`.
///
/// `key_offset` is the byte offset of the comparison key inside a record
/// (0 for ids, the record header size for names). Returns the matching
/// record's offset in the data region; with duplicate keys any one of
/// them. A structurally corrupt index yields `None`, never a panic.
pub fn search(file: &CacheFile, key: &SearchKey<'_>, key_offset: usize) -> Option<u64> {
    let index = file.index(key.index_kind());
    let data = file.data();

    let mut lo = 0usize;
    let mut hi = index.len() / 8;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let rec_off = format::read_u64(index, mid * 8)?;
        match compare_at(data, rec_off, key_offset, key)? {
            Ordering::Less => hi = mid,
            Ordering::Greater => lo = mid + 1,
            Ordering::Equal => return Some(rec_off),
        }
    }
    None
}

/// Compare the sought key against the record starting at `rec_off`.
fn compare_at(
    data: &[u8],
    rec_off: u64,
    key_offset: usize,
    key: &SearchKey<'_>,
) -> Option<Ordering> {
    let at = usize::try_from(rec_off).ok()?.checked_add(key_offset)?;
    match key {
        SearchKey::Id(id) => {
            let entry_id = format::read_u64(data, at)?;
            Some(id.cmp(&entry_id))
        }
        SearchKey::Name(name) => {
            let entry_name = format::cstr_at(data, at);
            Some((*name).cmp(entry_name))
        }
    }
}
