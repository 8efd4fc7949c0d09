//! glibc's `enum nss_status` return values.

/// Status returned to the NSS host for every module entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NssStatus {
    /// Transient failure; for lookups this means the caller's buffer was
    /// too small and should be retried larger (`ERANGE`).
    TryAgain = -2,
    /// The cache is missing or malformed; the host consults the next
    /// configured NSS source.
    Unavail = -1,
    /// The key is not in the cache, or enumeration is past the end.
    NotFound = 0,
    Success = 1,
}
