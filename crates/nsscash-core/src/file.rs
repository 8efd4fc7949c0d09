//! Memory-mapped access to cache files.
//!
//! [`CacheFile::open`] maps a cache read-only and validates the header and
//! region bounds once; after that every accessor is infallible slicing.
//! Dropping the value unmaps. When the fetch tool renames a new cache over
//! the old path, existing mappings keep reading the unlinked old inode
//! until they are dropped, so readers never observe a torn file.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::format::{self, HEADER_SIZE, MAGIC, VERSION};

/// Which precomputed index to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Input order, used for enumeration.
    Orig,
    /// Ascending uid/gid.
    Id,
    /// Ascending name, byte-wise.
    Name,
}

/// A validated, read-only mapping of a cache file.
#[derive(Debug)]
pub struct CacheFile {
    map: Mmap,
    count: u64,
    off_orig: usize,
    off_id: usize,
    off_name: usize,
    off_data: usize,
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

impl CacheFile {
    /// Open and map `path`, validating magic, version and region bounds.
    ///
    /// A missing file surfaces as `NotFound`, a malformed one as
    /// `InvalidData`; other errors keep their OS errno.
    pub fn open(path: &Path) -> io::Result<CacheFile> {
        let file = File::open(path)?;
        // A private read-only mapping; the kernel stats the file for us
        let map = unsafe { MmapOptions::new().map_copy_read_only(&file)? };
        Self::validate(map)
    }

    fn validate(map: Mmap) -> io::Result<CacheFile> {
        let bytes: &[u8] = &map;
        if bytes.len() < HEADER_SIZE {
            return Err(invalid("cache file shorter than header"));
        }
        if &bytes[..8] != MAGIC {
            return Err(invalid("bad magic"));
        }
        // An unknown version is rejected, never guessed at; this also
        // catches byte-swapped files written on a foreign-endian host
        if format::read_u64(bytes, 8) != Some(VERSION) {
            return Err(invalid("unsupported cache version"));
        }

        let count = format::read_u64(bytes, 16).ok_or_else(|| invalid("truncated header"))?;
        let region_len = bytes.len() - HEADER_SIZE;
        let index_len = (count as usize)
            .checked_mul(8)
            .filter(|&l| l <= region_len)
            .ok_or_else(|| invalid("record count out of range"))?;

        let mut offs = [0usize; 4];
        for (i, off) in offs.iter_mut().enumerate() {
            let raw = format::read_u64(bytes, 24 + 8 * i)
                .ok_or_else(|| invalid("truncated header"))?;
            *off = usize::try_from(raw).map_err(|_| invalid("region offset out of range"))?;
        }
        let [off_orig, off_id, off_name, off_data] = offs;
        for off in [off_orig, off_id, off_name] {
            if off.checked_add(index_len).map_or(true, |end| end > region_len) {
                return Err(invalid("index region out of bounds"));
            }
        }
        if off_data > region_len {
            return Err(invalid("data region out of bounds"));
        }

        Ok(CacheFile {
            map,
            count,
            off_orig,
            off_id,
            off_name,
            off_data,
        })
    }

    /// Number of records in the cache.
    pub fn count(&self) -> u64 {
        self.count
    }

    fn region(&self) -> &[u8] {
        &self.map[HEADER_SIZE..]
    }

    /// The raw bytes of one index region (`count` little-endian u64s).
    pub fn index(&self, kind: IndexKind) -> &[u8] {
        let off = match kind {
            IndexKind::Orig => self.off_orig,
            IndexKind::Id => self.off_id,
            IndexKind::Name => self.off_name,
        };
        &self.region()[off..off + self.count as usize * 8]
    }

    /// The record data region.
    pub fn data(&self) -> &[u8] {
        &self.region()[self.off_data..]
    }

    /// The `i`-th entry of an index: a record offset into the data region.
    pub fn record_offset(&self, kind: IndexKind, i: u64) -> Option<u64> {
        if i >= self.count {
            return None;
        }
        format::read_u64(self.index(kind), i as usize * 8)
    }
}
