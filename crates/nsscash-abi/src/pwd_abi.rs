//! ABI layer for the passwd cache.
//!
//! Implements `_nss_cash_setpwent`, `_nss_cash_endpwent`,
//! `_nss_cash_getpwent_r`, `_nss_cash_getpwuid_r` and
//! `_nss_cash_getpwnam_r` on top of the mapped cache reader.
//!
//! NOTE: This file is very similar to grp_abi.rs, keep in sync!

use std::ffi::{c_char, c_int, CStr};
use std::path::Path;
use std::ptr;

use parking_lot::Mutex;

use nsscash_core::file::{CacheFile, IndexKind};
use nsscash_core::passwd::{PasswdEntry, ENTRY_HEADER_SIZE};
use nsscash_core::search::{search, SearchKey};

use crate::paths::PASSWD_FILE;
use crate::{errno_from_io, EnumFile, NssStatus};

static PASSWD_ENUM: Mutex<EnumFile> = Mutex::new(EnumFile::new());

/// Copy `entry`'s data block into `buffer` and point `result`'s string
/// fields at it.
///
/// Returns false when `buffer` cannot hold the block; the caller maps
/// that to `ERANGE`/try-again without touching any cursor.
///
/// # Safety
///
/// `result` must be valid for writes and `buffer` for `buflen` bytes.
unsafe fn entry_to_passwd(
    entry: &PasswdEntry<'_>,
    result: *mut libc::passwd,
    buffer: *mut c_char,
    buflen: usize,
) -> bool {
    let size = entry.data.len();
    if buflen < size {
        return false;
    }

    // SAFETY: size <= buflen and all offsets lie inside data (u16 offsets
    // into a block whose length was itself serialized as u16).
    unsafe {
        ptr::copy_nonoverlapping(entry.data.as_ptr(), buffer.cast::<u8>(), size);
        (*result).pw_uid = entry.uid as libc::uid_t;
        (*result).pw_gid = entry.gid as libc::gid_t;
        (*result).pw_name = buffer;
        (*result).pw_passwd = buffer.add(entry.off_passwd as usize);
        (*result).pw_gecos = buffer.add(entry.off_gecos as usize);
        (*result).pw_dir = buffer.add(entry.off_dir as usize);
        (*result).pw_shell = buffer.add(entry.off_shell as usize);
    }
    true
}

/// One enumeration step against `state`, mapping the cache lazily.
unsafe fn internal_getpwent(
    state: &mut EnumFile,
    path: &Path,
    result: *mut libc::passwd,
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
        .and_then(|off| PasswdEntry::parse(file.data(), off));
    let Some(entry) = entry else {
        return (NssStatus::Unavail, libc::EINVAL);
    };
    if !unsafe { entry_to_passwd(&entry, result, buffer, buflen) } {
        // Do not advance; the caller retries with a larger buffer
        return (NssStatus::TryAgain, libc::ERANGE);
    }
    state.next_index += 1;

    (NssStatus::Success, 0)
}

/// Single-shot lookup: map, search, materialise, unmap.
unsafe fn internal_getpw(
    path: &Path,
    key: SearchKey<'_>,
    result: *mut libc::passwd,
    buffer: *mut c_char,
    buflen: usize,
) -> (NssStatus, c_int) {
    let file = match CacheFile::open(path) {
        Ok(file) => file,
        Err(err) => return (NssStatus::Unavail, errno_from_io(&err)),
    };

    let key_offset = match key {
        SearchKey::Id(_) => 0, // uid leads the record
        SearchKey::Name(_) => ENTRY_HEADER_SIZE, // name is first in data
    };
    let Some(off) = search(&file, &key, key_offset) else {
        return (NssStatus::NotFound, libc::ENOENT);
    };
    let Some(entry) = PasswdEntry::parse(file.data(), off) else {
        return (NssStatus::Unavail, libc::EINVAL);
    };
    if !unsafe { entry_to_passwd(&entry, result, buffer, buflen) } {
        return (NssStatus::TryAgain, libc::ERANGE);
    }

    (NssStatus::Success, 0) // dropping `file` unmaps
}

/// NSS `setpwent` — rewind enumeration and drop the retained mapping so a
/// replaced cache file is picked up.
#[no_mangle]
pub extern "C" fn _nss_cash_setpwent(_stayopen: c_int) -> NssStatus {
    PASSWD_ENUM.lock().reset();
    NssStatus::Success
}

/// NSS `endpwent` — close the enumeration.
#[no_mangle]
pub extern "C" fn _nss_cash_endpwent() -> NssStatus {
    PASSWD_ENUM.lock().reset();
    NssStatus::Success
}

/// NSS `getpwent_r` — next passwd entry in cache (insertion) order.
///
/// # Safety
///
/// `result`, `buffer` and `errnop` must be valid pointers; `buflen` must
/// reflect the size of `buffer`.
#[no_mangle]
pub unsafe extern "C" fn _nss_cash_getpwent_r(
    result: *mut libc::passwd,
    buffer: *mut c_char,
    buflen: libc::size_t,
    errnop: *mut c_int,
) -> NssStatus {
    if result.is_null() || buffer.is_null() || errnop.is_null() {
        return NssStatus::Unavail;
    }

    let mut state = PASSWD_ENUM.lock();
    let (status, errno) =
        unsafe { internal_getpwent(&mut state, Path::new(PASSWD_FILE), result, buffer, buflen) };
    if status != NssStatus::Success {
        // SAFETY: errnop is non-null.
        unsafe { *errnop = errno };
    }
    status
}

/// NSS `getpwuid_r` — look up a passwd entry by uid.
///
/// # Safety
///
/// `result`, `buffer` and `errnop` must be valid pointers.
#[no_mangle]
pub unsafe extern "C" fn _nss_cash_getpwuid_r(
    uid: libc::uid_t,
    result: *mut libc::passwd,
    buffer: *mut c_char,
    buflen: libc::size_t,
    errnop: *mut c_int,
) -> NssStatus {
    if result.is_null() || buffer.is_null() || errnop.is_null() {
        return NssStatus::Unavail;
    }

    let (status, errno) = unsafe {
        internal_getpw(
            Path::new(PASSWD_FILE),
            SearchKey::Id(u64::from(uid)),
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

/// NSS `getpwnam_r` — look up a passwd entry by name.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string; `result`, `buffer` and
/// `errnop` must be valid pointers.
#[no_mangle]
pub unsafe extern "C" fn _nss_cash_getpwnam_r(
    name: *const c_char,
    result: *mut libc::passwd,
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
        internal_getpw(
            Path::new(PASSWD_FILE),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::mem;
    use std::path::PathBuf;

    use nsscash_core::passwd::{parse_passwds, serialize_passwds};

    fn cache_file(text: &[u8]) -> tempfile::NamedTempFile {
        let pws = parse_passwds(text).unwrap();
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&serialize_passwds(&pws).unwrap()).unwrap();
        f.flush().unwrap();
        f
    }

    fn sample() -> tempfile::NamedTempFile {
        cache_file(
            b"root:x:0:0:root:/root:/bin/bash\n\
              daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n",
        )
    }

    unsafe fn cstr<'a>(p: *const c_char) -> &'a [u8] {
        unsafe { CStr::from_ptr(p) }.to_bytes()
    }

    fn lookup(
        path: &Path,
        key: SearchKey<'_>,
        buflen: usize,
    ) -> (NssStatus, c_int, libc::passwd, Vec<u8>) {
        let mut pw: libc::passwd = unsafe { mem::zeroed() };
        let mut buf = vec![0u8; buflen];
        let (status, errno) = unsafe {
            internal_getpw(path, key, &mut pw, buf.as_mut_ptr().cast::<c_char>(), buf.len())
        };
        (status, errno, pw, buf)
    }

    #[test]
    fn lookup_by_name_and_uid() {
        let f = sample();
        let (status, _, pw, _buf) = lookup(f.path(), SearchKey::Name(b"root"), 256);
        assert_eq!(status, NssStatus::Success);
        assert_eq!(pw.pw_uid, 0);
        unsafe {
            assert_eq!(cstr(pw.pw_name), b"root");
            assert_eq!(cstr(pw.pw_shell), b"/bin/bash");
        }

        let (status, _, pw, _buf) = lookup(f.path(), SearchKey::Id(1), 256);
        assert_eq!(status, NssStatus::Success);
        unsafe {
            assert_eq!(cstr(pw.pw_name), b"daemon");
            assert_eq!(cstr(pw.pw_dir), b"/usr/sbin");
        }
    }

    #[test]
    fn missing_key_is_not_found() {
        let f = sample();
        let (status, errno, _, _) = lookup(f.path(), SearchKey::Id(4711), 256);
        assert_eq!(status, NssStatus::NotFound);
        assert_eq!(errno, libc::ENOENT);
    }

    #[test]
    fn missing_cache_is_unavailable() {
        let (status, errno, _, _) = lookup(
            Path::new("/nonexistent/passwd.nsscash"),
            SearchKey::Id(0),
            256,
        );
        assert_eq!(status, NssStatus::Unavail);
        assert_eq!(errno, libc::ENOENT);
    }

    #[test]
    fn corrupt_cache_is_unavailable_with_einval() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"NSS-TRASH lorem ipsum dolor sit amet consectetur adipiscing")
            .unwrap();
        f.flush().unwrap();
        let (status, errno, _, _) = lookup(f.path(), SearchKey::Id(0), 256);
        assert_eq!(status, NssStatus::Unavail);
        assert_eq!(errno, libc::EINVAL);
    }

    #[test]
    fn exact_buffer_fits_and_one_less_does_not() {
        let f = sample();
        // data of root: "root\0x\0root\0/root\0/bin/bash\0" = 28 bytes
        let needed = 28;
        let (status, _, _, _) = lookup(f.path(), SearchKey::Name(b"root"), needed);
        assert_eq!(status, NssStatus::Success);

        let (status, errno, _, _) = lookup(f.path(), SearchKey::Name(b"root"), needed - 1);
        assert_eq!(status, NssStatus::TryAgain);
        assert_eq!(errno, libc::ERANGE);
    }

    #[test]
    fn enumeration_walks_in_order_and_terminates() {
        let f = sample();
        let mut state = EnumFile::new();
        let mut pw: libc::passwd = unsafe { mem::zeroed() };
        let mut buf = vec![0u8; 256];

        let mut names = Vec::new();
        loop {
            let (status, errno) = unsafe {
                internal_getpwent(
                    &mut state,
                    f.path(),
                    &mut pw,
                    buf.as_mut_ptr().cast::<c_char>(),
                    buf.len(),
                )
            };
            if status != NssStatus::Success {
                assert_eq!(status, NssStatus::NotFound);
                assert_eq!(errno, libc::ENOENT);
                break;
            }
            names.push(unsafe { cstr(pw.pw_name) }.to_vec());
        }
        assert_eq!(names, vec![b"root".to_vec(), b"daemon".to_vec()]);
    }

    #[test]
    fn short_buffer_does_not_advance_the_cursor() {
        let f = sample();
        let mut state = EnumFile::new();
        let mut pw: libc::passwd = unsafe { mem::zeroed() };
        let mut tiny = [0u8; 4];

        for _ in 0..3 {
            let (status, errno) = unsafe {
                internal_getpwent(
                    &mut state,
                    f.path(),
                    &mut pw,
                    tiny.as_mut_ptr().cast::<c_char>(),
                    tiny.len(),
                )
            };
            assert_eq!(status, NssStatus::TryAgain);
            assert_eq!(errno, libc::ERANGE);
            assert_eq!(state.next_index, 0);
        }

        let mut buf = vec![0u8; 256];
        let (status, _) = unsafe {
            internal_getpwent(
                &mut state,
                f.path(),
                &mut pw,
                buf.as_mut_ptr().cast::<c_char>(),
                buf.len(),
            )
        };
        assert_eq!(status, NssStatus::Success);
        unsafe { assert_eq!(cstr(pw.pw_name), b"root") };
    }

    #[test]
    fn reset_picks_up_a_replaced_file() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("passwd.nsscash");
        let first = cache_file(b"root:x:0:0:root:/root:/bin/bash\n");
        std::fs::copy(first.path(), &path).unwrap();

        let mut state = EnumFile::new();
        let mut pw: libc::passwd = unsafe { mem::zeroed() };
        let mut buf = vec![0u8; 256];
        let (status, _) = unsafe {
            internal_getpwent(
                &mut state,
                &path,
                &mut pw,
                buf.as_mut_ptr().cast::<c_char>(),
                buf.len(),
            )
        };
        assert_eq!(status, NssStatus::Success);

        // Replace on disk; the retained mapping still sees the old data
        // until the enumeration is reset
        let second = cache_file(b"other:x:5:5:other:/home/other:/bin/sh\n");
        std::fs::copy(second.path(), &path).unwrap();
        state.reset();

        let (status, _) = unsafe {
            internal_getpwent(
                &mut state,
                &path,
                &mut pw,
                buf.as_mut_ptr().cast::<c_char>(),
                buf.len(),
            )
        };
        assert_eq!(status, NssStatus::Success);
        unsafe { assert_eq!(cstr(pw.pw_name), b"other") };
    }
}
