// SPDX-License-Identifier: MIT

//! Wide string conversion routines.

use std::ffi::{OsStr, OsString};
use std::os::windows::ffi::{OsStrExt, OsStringExt};

/// Convert the OS string into a null-terminated wide (16-bit) C string.
pub fn as_c_str_w(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

/// Copy a null-terminated wide string that the OS allocated.
///
/// # Safety
///
/// `ptr` must point to a readable, null-terminated UTF-16 buffer.
pub unsafe fn from_c_str_w(ptr: *const u16) -> OsString {
    let mut len = 0;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    OsString::from_wide(unsafe { std::slice::from_raw_parts(ptr, len) })
}
