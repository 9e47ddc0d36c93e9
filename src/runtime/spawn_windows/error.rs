// SPDX-License-Identifier: MIT

//! Windows based errors.

use windows::Win32::Foundation::WIN32_ERROR;
use windows_result::HRESULT;

use crate::runtime::error::SandboxError;

/// Map a `windows::core::Error` from `operation` into a `SandboxError`.
pub fn win_err(operation: &'static str) -> impl Fn(windows::core::Error) -> SandboxError {
    move |e| SandboxError::os(operation, e.code().0, e.message())
}

/// Turn a status-returning Win32 call into a `Result`.
pub fn check_win32(operation: &'static str, status: WIN32_ERROR) -> Result<(), SandboxError> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(from_hresult(operation, status.to_hresult()))
    }
}

/// The last OS error, as reported by a Win32 call that returned failure.
pub fn last_os_error(operation: &'static str) -> SandboxError {
    let e = std::io::Error::last_os_error();
    SandboxError::os(operation, e.raw_os_error().unwrap_or_default(), e.to_string())
}

pub fn from_hresult(operation: &'static str, hr: HRESULT) -> SandboxError {
    SandboxError::os(operation, hr.0, hr.message())
}
