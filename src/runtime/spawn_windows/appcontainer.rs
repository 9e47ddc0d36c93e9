// SPDX-License-Identifier: MIT

//! Wrapper for the AppContainer profile work.
//! Because much of windows requires explicit add/remove actions,
//! wrapping the SID in a single struct that implements Drop keeps the
//! ownership in one place.

use std::any::Any;
use std::ffi::OsStr;

use windows::Win32::Foundation::{ERROR_ALREADY_EXISTS, ERROR_FILE_NOT_FOUND, ERROR_NOT_FOUND};
use windows::Win32::Security::{self, Isolation};
use windows::core::PCWSTR;

use super::conv::{as_c_str_w, from_c_str_w};
use super::error::{last_os_error, win_err};
use crate::runtime::config::ProfileConfig;
use crate::runtime::error::SandboxError;
use crate::runtime::spawn::SecurityPrincipal;

/// The SID of an AppContainer profile.
pub struct AppContainerSid {
    sid: Option<Security::PSID>,
    sid_string: String,
}

// SAFETY: the SID buffer is owned by this value, never mutated after
// creation, and only freed in Drop.
unsafe impl Send for AppContainerSid {}
unsafe impl Sync for AppContainerSid {}

impl AppContainerSid {
    /// Register a new profile.  Reports `AlreadyExists` when the name is taken.
    pub fn create(profile: &ProfileConfig) -> Result<Self, SandboxError> {
        let name = as_c_str_w(OsStr::new(&profile.name));
        let display_name = as_c_str_w(OsStr::new(&profile.display_name));
        let description = as_c_str_w(OsStr::new(&profile.description));
        match unsafe {
            Isolation::CreateAppContainerProfile(
                PCWSTR(name.as_ptr()),         // pszAppContainerName: identifies the container profile
                PCWSTR(display_name.as_ptr()), // pszDisplayName: human-readable
                PCWSTR(description.as_ptr()),  // pszDescription
                None,                          // pCapabilities: granted per launch, not per profile
            )
        } {
            Ok(sid) => Self::from_owned(sid),
            Err(e) if e.code() == ERROR_ALREADY_EXISTS.to_hresult() => {
                Err(SandboxError::AlreadyExists(profile.name.clone()))
            }
            Err(e) => Err(win_err("CreateAppContainerProfile")(e)),
        }
    }

    /// Look up the SID of an existing profile.
    pub fn derive(name: &str) -> Result<Self, SandboxError> {
        let name = as_c_str_w(OsStr::new(name));
        let sid = unsafe { Isolation::DeriveAppContainerSidFromAppContainerName(PCWSTR(name.as_ptr())) }
            .map_err(win_err("DeriveAppContainerSidFromAppContainerName"))?;
        Self::from_owned(sid)
    }

    /// Remove the profile registration.  Reports `NotFound` when there is none.
    pub fn delete(name: &str) -> Result<(), SandboxError> {
        let wide = as_c_str_w(OsStr::new(name));
        match unsafe { Isolation::DeleteAppContainerProfile(PCWSTR(wide.as_ptr())) } {
            Ok(()) => Ok(()),
            Err(e)
                if e.code() == ERROR_NOT_FOUND.to_hresult()
                    || e.code() == ERROR_FILE_NOT_FOUND.to_hresult() =>
            {
                Err(SandboxError::NotFound(name.to_string()))
            }
            Err(e) => Err(win_err("DeleteAppContainerProfile")(e)),
        }
    }

    /// Take ownership of a SID allocated by the profile APIs.
    fn from_owned(sid: Security::PSID) -> Result<Self, SandboxError> {
        let mut ret = Self {
            sid: Some(sid),
            sid_string: String::new(),
        };
        // On failure, `ret` drops and frees the SID.
        ret.sid_string = sid_str(sid)?;
        Ok(ret)
    }

    pub fn sid(&self) -> Option<Security::PSID> {
        self.sid
    }
}

/// String form of a SID.
/// The windows crate doesn't wrap this, so it uses the lower level binding.
fn sid_str(sid: Security::PSID) -> Result<String, SandboxError> {
    // Windows creates the string in a buffer that this then needs to free.
    let mut buf_ptr: *mut u16 = std::ptr::null_mut();
    let result = unsafe { winapi::shared::sddl::ConvertSidToStringSidW(sid.0 as _, &mut buf_ptr) };
    if result == 0 {
        return Err(last_os_error("ConvertSidToStringSidW"));
    }
    let value = unsafe { from_c_str_w(buf_ptr) };
    unsafe { winapi::um::winbase::LocalFree(buf_ptr as *mut _) };
    Ok(value.to_string_lossy().into_owned())
}

impl std::fmt::Debug for AppContainerSid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AppContainerSid").field(&self.sid_string).finish()
    }
}

impl SecurityPrincipal for AppContainerSid {
    fn principal_id(&self) -> &str {
        &self.sid_string
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for AppContainerSid {
    fn drop(&mut self) {
        if let Some(sid) = self.sid.take() {
            let _ = unsafe { Security::FreeSid(sid) };
        }
    }
}
