// SPDX-License-Identifier: MIT

//! Well-known capability SIDs.

use std::any::Any;
use std::ffi::OsStr;

use windows::Win32::Foundation::{HLOCAL, LocalFree};
use windows::Win32::Security::{Authorization, PSID};
use windows::core::PCWSTR;

use super::conv::as_c_str_w;
use super::error::win_err;
use crate::runtime::capability::CapabilityKind;
use crate::runtime::error::SandboxError;
use crate::runtime::spawn::SecurityPrincipal;

pub struct CapabilitySid {
    kind: CapabilityKind,
    sid: PSID,
}

// SAFETY: the SID buffer is owned by this value and read-only until Drop.
unsafe impl Send for CapabilitySid {}
unsafe impl Sync for CapabilitySid {}

impl CapabilitySid {
    pub fn resolve(kind: CapabilityKind) -> Result<Self, SandboxError> {
        let text = as_c_str_w(OsStr::new(kind.sid()));
        let mut sid = PSID::default();
        unsafe { Authorization::ConvertStringSidToSidW(PCWSTR(text.as_ptr()), &mut sid) }
            .map_err(win_err("ConvertStringSidToSidW"))?;
        Ok(Self { kind, sid })
    }

    pub fn sid(&self) -> PSID {
        self.sid
    }
}

impl std::fmt::Debug for CapabilitySid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CapabilitySid").field(&self.kind.sid()).finish()
    }
}

impl SecurityPrincipal for CapabilitySid {
    fn principal_id(&self) -> &str {
        self.kind.sid()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for CapabilitySid {
    fn drop(&mut self) {
        if !self.sid.0.is_null() {
            let _ = unsafe { LocalFree(Some(HLOCAL(self.sid.0))) };
        }
    }
}
