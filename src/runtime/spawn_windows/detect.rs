// SPDX-License-Identifier: MIT

//! Runtime checks for the system components the providers call into.
//!
//! Both AppContainer profiles and AMSI are optional parts of the OS image, so
//! a Windows build is not proof that they exist on the running host.

use std::ffi::{CStr, OsStr};

use tracing::debug;
use windows::Win32::Foundation::FreeLibrary;
use windows::Win32::System::LibraryLoader::{
    GetProcAddress, LOAD_LIBRARY_SEARCH_SYSTEM32, LoadLibraryExW,
};
use windows::core::{PCSTR, PCWSTR};

use super::conv::as_c_str_w;

/// Whether `library`, loaded from the system directory, exports `symbol`.
pub fn exports(library: &str, symbol: &CStr) -> bool {
    let name = as_c_str_w(OsStr::new(library));
    let module = match unsafe {
        LoadLibraryExW(PCWSTR(name.as_ptr()), None, LOAD_LIBRARY_SEARCH_SYSTEM32)
    } {
        Ok(module) => module,
        Err(e) => {
            debug!(library, error = %e, "system library is not present");
            return false;
        }
    };
    let found = unsafe { GetProcAddress(module, PCSTR(symbol.as_ptr().cast())) }.is_some();
    let _ = unsafe { FreeLibrary(module) };
    if !found {
        debug!(library, ?symbol, "system library lacks the entry point");
    }
    found
}

pub fn app_container_available() -> bool {
    exports("userenv.dll", c"CreateAppContainerProfile")
        && exports("userenv.dll", c"DeriveAppContainerSidFromAppContainerName")
}

pub fn amsi_available() -> bool {
    exports("amsi.dll", c"AmsiInitialize") && exports("amsi.dll", c"AmsiScanBuffer")
}
