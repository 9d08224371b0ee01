//! Utility helpers for page size, alignment, and bounds checks.

use std::sync::OnceLock;

use crate::errors::{MmapViewError, Result};

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Get the system page size in bytes.
///
/// The value is queried from the OS once and cached for the life of the process.
#[must_use]
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "windows")] {
                windows_page_size()
            } else {
                unix_page_size()
            }
        }
    })
}

#[cfg(target_os = "windows")]
fn windows_page_size() -> usize {
    use std::mem::MaybeUninit;
    #[allow(non_snake_case)]
    #[repr(C)]
    struct SYSTEM_INFO {
        wProcessorArchitecture: u16,
        wReserved: u16,
        dwPageSize: u32,
        lpMinimumApplicationAddress: *mut core::ffi::c_void,
        lpMaximumApplicationAddress: *mut core::ffi::c_void,
        dwActiveProcessorMask: usize,
        dwNumberOfProcessors: u32,
        dwProcessorType: u32,
        dwAllocationGranularity: u32,
        wProcessorLevel: u16,
        wProcessorRevision: u16,
    }
    extern "system" {
        fn GetSystemInfo(lpSystemInfo: *mut SYSTEM_INFO);
    }
    let mut sysinfo = MaybeUninit::<SYSTEM_INFO>::uninit();
    // SAFETY: GetSystemInfo fully initializes the struct it is handed.
    unsafe {
        GetSystemInfo(sysinfo.as_mut_ptr());
        let s = sysinfo.assume_init();
        s.dwPageSize as usize
    }
}

#[cfg(not(target_os = "windows"))]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unix_page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE is safe to call.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        4096
    } else {
        page_size as usize
    }
}

/// Round `value` down to the nearest multiple of `alignment`.
#[must_use]
pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    if alignment.is_power_of_two() {
        value & !(alignment - 1)
    } else {
        value - (value % alignment)
    }
}

/// Ensure the access `[offset, offset+len)` fits inside `[0, capacity)`.
///
/// # Errors
///
/// Returns `MmapViewError::OutOfRange` if the access would cross `capacity`,
/// including when `offset + len` overflows.
pub fn ensure_in_bounds(offset: u64, len: u64, capacity: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(MmapViewError::OutOfRange {
            offset,
            len,
            capacity,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        let ps = page_size();
        assert!(ps >= 512);
        assert!(ps.is_power_of_two());
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(5000, 4096), 4096);
        assert_eq!(align_down(4096, 4096), 4096);
        assert_eq!(align_down(10, 4096), 0);
        assert_eq!(align_down(25, 10), 20);
    }

    #[test]
    fn bounds_checks() {
        assert!(ensure_in_bounds(0, 8, 8).is_ok());
        assert!(ensure_in_bounds(92, 8, 100).is_ok());
        assert!(ensure_in_bounds(93, 8, 100).is_err());
        assert!(ensure_in_bounds(100, 1, 100).is_err());
        assert!(ensure_in_bounds(u64::MAX, 2, 100).is_err());
        // Zero-width accesses are allowed up to the end.
        assert!(ensure_in_bounds(100, 0, 100).is_ok());
        assert!(ensure_in_bounds(101, 0, 100).is_err());
    }
}
