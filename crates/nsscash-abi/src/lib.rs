//! NSS service module for binary account caches.
//!
//! Exports the `_nss_cash_*` symbols glibc expects from an NSS module for
//! the passwd and group databases. Enumeration (`set/get/end*ent`) keeps a
//! process-wide mapping plus cursor behind a mutex; single-shot lookups
//! map the cache, binary search, materialise into the caller's buffer and
//! unmap before returning. The module is loaded into arbitrary host
//! processes, so the lookup path never allocates and never panics.

use std::io;

use nsscash_core::file::CacheFile;

pub mod grp_abi;
pub mod paths;
pub mod pwd_abi;
mod status;

pub use status::NssStatus;

/// Process-wide enumeration state for one database: the retained mapping
/// and the cursor into the orig index.
struct EnumFile {
    file: Option<CacheFile>,
    next_index: u64,
}

impl EnumFile {
    const fn new() -> Self {
        EnumFile {
            file: None,
            next_index: 0,
        }
    }

    /// Drop the mapping and rewind. The next `get*ent_r` remaps, which is
    /// how an atomically replaced cache file becomes visible.
    fn reset(&mut self) {
        self.file = None;
        self.next_index = 0;
    }
}

/// The errno value to report for a failed open/map/validate.
fn errno_from_io(err: &io::Error) -> libc::c_int {
    if let Some(raw) = err.raw_os_error() {
        return raw;
    }
    match err.kind() {
        io::ErrorKind::NotFound => libc::ENOENT,
        io::ErrorKind::InvalidData => libc::EINVAL,
        _ => libc::EIO,
    }
}
