//! On-disk layout shared by passwd and group caches.
//!
//! A cache file is `[header] [orig_index] [id_index] [name_index] [data]`.
//! The header stores the region offsets relative to its own end; each index
//! is `count` little-endian u64 record offsets into the data region. All
//! integers on disk are little-endian; a byte-swapped `version` can never
//! equal [`VERSION`], so foreign-endian files are rejected rather than
//! converted.

use crate::Error;

/// Magic bytes at the start of every cache file (no trailing NUL).
pub const MAGIC: &[u8; 8] = b"NSS-CASH";

/// The only supported format version. Doubles as a byte-order check.
pub const VERSION: u64 = 1;

/// Fixed header size: magic, version, count and four region offsets.
pub const HEADER_SIZE: usize = 56;

/// Read a little-endian u64 at `off`, `None` when out of bounds.
pub(crate) fn read_u64(bytes: &[u8], off: usize) -> Option<u64> {
    let raw = bytes.get(off..off.checked_add(8)?)?;
    Some(u64::from_le_bytes(raw.try_into().ok()?))
}

/// Read a little-endian u16 at `off`, `None` when out of bounds.
pub(crate) fn read_u16(bytes: &[u8], off: usize) -> Option<u16> {
    let raw = bytes.get(off..off.checked_add(2)?)?;
    Some(u16::from_le_bytes(raw.try_into().ok()?))
}

/// The NUL-terminated byte string starting at `off`.
///
/// Returns the bytes up to (excluding) the first NUL; an out-of-bounds
/// offset or a missing terminator yields the available suffix, so corrupt
/// input degrades to a failed comparison instead of a panic.
pub(crate) fn cstr_at(bytes: &[u8], off: usize) -> &[u8] {
    let rest = bytes.get(off..).unwrap_or(&[]);
    match rest.iter().position(|&b| b == 0) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// Pad `buf` with NUL bytes until its length is a multiple of `align`.
pub(crate) fn align_buffer_to(buf: &mut Vec<u8>, align: usize) {
    debug_assert!(align.is_power_of_two());
    while buf.len() % align != 0 {
        buf.push(0);
    }
}

/// Assemble a complete cache file from the three indices and the record
/// data. The indices must each hold exactly `count` u64 offsets.
pub(crate) fn write_cache(
    count: u64,
    index_orig: &[u8],
    index_id: &[u8],
    index_name: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, Error> {
    let expected = (count as usize).checked_mul(8).ok_or(Error::IndexLength)?;
    if index_orig.len() != expected
        || index_id.len() != expected
        || index_name.len() != expected
    {
        return Err(Error::IndexLength);
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + 3 * expected + data.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());

    // Region offsets, relative to the end of the header
    let mut offset = 0u64;
    out.extend_from_slice(&offset.to_le_bytes());
    offset += index_orig.len() as u64;
    out.extend_from_slice(&offset.to_le_bytes());
    offset += index_id.len() as u64;
    out.extend_from_slice(&offset.to_le_bytes());
    offset += index_name.len() as u64;
    out.extend_from_slice(&offset.to_le_bytes());

    out.extend_from_slice(index_orig);
    out.extend_from_slice(index_id);
    out.extend_from_slice(index_name);
    out.extend_from_slice(data);
    Ok(out)
}
