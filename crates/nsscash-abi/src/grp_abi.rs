//! ABI layer for the group cache.
//!
//! Implements `_nss_cash_setgrent`, `_nss_cash_endgrent`,
//! `_nss_cash_getgrent_r`, `_nss_cash_getgrgid_r` and
//! `_nss_cash_getgrnam_r`.
//!
//! NOTE: This file is very similar to pwd_abi.rs, keep in sync!

use std::ffi::{c_char, c_int, CStr};
use std::path::Path;
use std::ptr;

use parking_lot::Mutex;

use nsscash_core::file::{CacheFile, IndexKind};
use nsscash_core::group::{GroupEntry, ENTRY_HEADER_SIZE};
use nsscash_core::search::{search, SearchKey};

use crate::paths::GROUP_FILE;
use crate::{errno_from_io, EnumFile, NssStatus};

static GROUP_ENUM: Mutex<EnumFile> = Mutex::new(EnumFile::new());

/// Materialise `entry` into `buffer` and fill `result`.
///
/// Buffer layout: first `mem_count + 1` `char *` slots (the last one
/// NULL), then a copy of the record's data block; the member pointers
/// point into that copy. Returns false when `buffer` is too small.
///
/// # Safety
///
/// `result` must be valid for writes and `buffer` for `buflen` bytes.
unsafe fn entry_to_group(
    entry: &GroupEntry<'_>,
    result: *mut libc::group,
    buffer: *mut c_char,
    buflen: usize,
) -> bool {
    let mem_count = entry.mem_count as usize;
    let ptr_bytes = (mem_count + 1) * std::mem::size_of::<*mut c_char>();
    let size = entry.data.len();
    if buflen < ptr_bytes + size {
        return false;
    }

    // SAFETY: ptr_bytes + size <= buflen; the member offset table was
    // bounds-checked when the entry was parsed. Copying the data block
    // wholesale also copies the offset table, which keeps the layout
    // identical to the record on disk.
    unsafe {
        let strings = buffer.add(ptr_bytes);
        ptr::copy_nonoverlapping(entry.data.as_ptr(), strings.cast::<u8>(), size);

        let members = buffer.cast::<*mut c_char>();
        for i in 0..mem_count {
            let off = match entry.member_offset(i) {
                Some(off) => off as usize,
                None => return false,
            };
            ptr::write_unaligned(members.add(i), strings.add(off));
        }
        ptr::write_unaligned(members.add(mem_count), ptr::null_mut());

        (*result).gr_gid = entry.gid as libc::gid_t;
        (*result).gr_name = strings;
        (*result).gr_passwd = strings.add(entry.off_passwd as usize);
        (*result).gr_mem = members;
    }
    true
}

/// One enumeration step against `state`, mapping the cache lazily.
unsafe fn internal_getgrent(
    state: &mut EnumFile,
    path: &Path,
    result: *mut libc::group,
    buffer: *mut c_char,
    buflen: usize,
) -> (NssStatus, c_int) {
    if state.file.is_none() {
        match CacheFile::open(path) {
            Ok(file) => state.file = Some(file),
            Err(err) => return (NssStatus::Unavail, errno_from_io(&err)),
        }
    }
    let Some(file) = state.file.as_ref() else {
        return (NssStatus::Unavail, libc::EIO);
    };

    if state.next_index >= file.count() {
        return (NssStatus::NotFound, libc::ENOENT);
    }

    let entry = file
        .record_offset(IndexKind::Orig, state.next_index)
        .and_then(|off| GroupEntry::parse(file.data(), off));
    let Some(entry) = entry else {
        return (NssStatus::Unavail, libc::EINVAL);
    };
    if !unsafe { entry_to_group(&entry, result, buffer, buflen) } {
        // Do not advance; the caller retries with a larger buffer
        return (NssStatus::TryAgain, libc::ERANGE);
    }
    state.next_index += 1;

    (NssStatus::Success, 0)
}

/// Single-shot lookup: map, search, materialise, unmap.
unsafe fn internal_getgr(
    path: &Path,
    key: SearchKey<'_>,
    result: *mut libc::group,
    buffer: *mut c_char,
    buflen: usize,
) -> (NssStatus, c_int) {
    let file = match CacheFile::open(path) {
        Ok(file) => file,
        Err(err) => return (NssStatus::Unavail, errno_from_io(&err)),
    };

    let key_offset = match key {
        SearchKey::Id(_) => 0, // gid leads the record
        SearchKey::Name(_) => ENTRY_HEADER_SIZE, // name is first in data
    };
    let Some(off) = search(&file, &key, key_offset) else {
        return (NssStatus::NotFound, libc::ENOENT);
    };
    let Some(entry) = GroupEntry::parse(file.data(), off) else {
        return (NssStatus::Unavail, libc::EINVAL);
    };
    if !unsafe { entry_to_group(&entry, result, buffer, buflen) } {
        return (NssStatus::TryAgain, libc::ERANGE);
    }

    (NssStatus::Success, 0) // dropping `file` unmaps
}

/// NSS `setgrent` — rewind enumeration and drop the retained mapping so a
/// replaced cache file is picked up.
#[no_mangle]
pub extern "C" fn _nss_cash_setgrent(_stayopen: c_int) -> NssStatus {
    GROUP_ENUM.lock().reset();
    NssStatus::Success
}

/// NSS `endgrent` — close the enumeration.
#[no_mangle]
pub extern "C" fn _nss_cash_endgrent() -> NssStatus {
    GROUP_ENUM.lock().reset();
    NssStatus::Success
}

/// NSS `getgrent_r` — next group entry in cache (insertion) order.
///
/// # Safety
///
/// `result`, `buffer` and `errnop` must be valid pointers; `buflen` must
/// reflect the size of `buffer`.
#[no_mangle]
pub unsafe extern "C" fn _nss_cash_getgrent_r(
    result: *mut libc::group,
    buffer: *mut c_char,
    buflen: libc::size_t,
    errnop: *mut c_int,
) -> NssStatus {
    if result.is_null() || buffer.is_null() || errnop.is_null() {
        return NssStatus::Unavail;
    }

    let mut state = GROUP_ENUM.lock();
    let (status, errno) =
        unsafe { internal_getgrent(&mut state, Path::new(GROUP_FILE), result, buffer, buflen) };
    if status != NssStatus::Success {
        // SAFETY: errnop is non-null.
        unsafe { *errnop = errno };
    }
    status
}

/// NSS `getgrgid_r` — look up a group entry by gid.
///
/// # Safety
///
/// `result`, `buffer` and `errnop` must be valid pointers.
#[no_mangle]
pub unsafe extern "C" fn _nss_cash_getgrgid_r(
    gid: libc::gid_t,
    result: *mut libc::group,
    buffer: *mut c_char,
    buflen: libc::size_t,
    errnop: *mut c_int,
) -> NssStatus {
    if result.is_null() || buffer.is_null() || errnop.is_null() {
        return NssStatus::Unavail;
    }

    let (status, errno) = unsafe {
        internal_getgr(
            Path::new(GROUP_FILE),
            SearchKey::Id(u64::from(gid)),
            result,
            buffer,
            buflen,
        )
    };
    if status != NssStatus::Success {
        // SAFETY: errnop is non-null.
        unsafe { *errnop = errno };
    }
    status
}

/// NSS `getgrnam_r` — look up a group entry by name.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string; `result`, `buffer` and
/// `errnop` must be valid pointers.
#[no_mangle]
pub unsafe extern "C" fn _nss_cash_getgrnam_r(
    name: *const c_char,
    result: *mut libc::group,
    buffer: *mut c_char,
    buflen: libc::size_t,
    errnop: *mut c_int,
) -> NssStatus {
    if name.is_null() || result.is_null() || buffer.is_null() || errnop.is_null() {
        return NssStatus::Unavail;
    }

    // SAFETY: name is non-null and NUL-terminated per the NSS contract.
    let name = unsafe { CStr::from_ptr(name) };
    let (status, errno) = unsafe {
        internal_getgr(
            Path::new(GROUP_FILE),
            SearchKey::Name(name.to_bytes()),
            result,
            buffer,
            buflen,
        )
    };
    if status != NssStatus::Success {
        // SAFETY: errnop is non-null.
        unsafe { *errnop = errno };
    }
    status
}
