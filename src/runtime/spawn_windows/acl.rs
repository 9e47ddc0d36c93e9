// SPDX-License-Identifier: MIT

//! Workspace access grants.
//!
//! The new entry is merged into the directory's existing DACL, written back,
//! and then read again to confirm the entry is present and nothing was lost.

use std::ffi::c_void;
use std::path::Path;

use windows::Win32::Foundation::{HLOCAL, LocalFree};
use windows::Win32::Security::Authorization::{
    EXPLICIT_ACCESS_W, GRANT_ACCESS, GetNamedSecurityInfoW, NO_MULTIPLE_TRUSTEE, SE_FILE_OBJECT,
    SetEntriesInAclW, SetNamedSecurityInfoW, TRUSTEE_IS_SID, TRUSTEE_IS_WELL_KNOWN_GROUP, TRUSTEE_W,
};
use windows::Win32::Security::{
    ACCESS_ALLOWED_ACE, ACL, DACL_SECURITY_INFORMATION, EqualSid, GetAce, PSECURITY_DESCRIPTOR, PSID,
    SUB_CONTAINERS_AND_OBJECTS_INHERIT,
};
use windows::Win32::Storage::FileSystem::{FILE_GENERIC_EXECUTE, FILE_GENERIC_READ, FILE_GENERIC_WRITE};
use windows::core::{PCWSTR, PWSTR};

use super::conv::as_c_str_w;
use super::error::check_win32;
use crate::runtime::error::SandboxError;

const ACCESS_ALLOWED_ACE_TYPE: u8 = 0;

fn granted_rights() -> u32 {
    FILE_GENERIC_READ.0 | FILE_GENERIC_WRITE.0 | FILE_GENERIC_EXECUTE.0
}

/// Memory the security APIs allocated with LocalAlloc.
struct LocalBox(*mut c_void);

impl Drop for LocalBox {
    fn drop(&mut self) {
        if !self.0.is_null() {
            let _ = unsafe { LocalFree(Some(HLOCAL(self.0))) };
        }
    }
}

/// A DACL that points into its owning security descriptor.
struct Dacl {
    _descriptor: LocalBox,
    acl: *mut ACL,
}

impl Dacl {
    fn read(path: &[u16]) -> Result<Self, SandboxError> {
        let mut acl: *mut ACL = std::ptr::null_mut();
        let mut sd = PSECURITY_DESCRIPTOR::default();
        let status = unsafe {
            GetNamedSecurityInfoW(
                PCWSTR(path.as_ptr()),
                SE_FILE_OBJECT,
                DACL_SECURITY_INFORMATION,
                None,
                None,
                Some(&mut acl),
                None,
                &mut sd,
            )
        };
        let descriptor = LocalBox(sd.0);
        check_win32("GetNamedSecurityInfoW", status)?;
        Ok(Self {
            _descriptor: descriptor,
            acl,
        })
    }

    fn ace_count(&self) -> u16 {
        if self.acl.is_null() {
            0
        } else {
            unsafe { (*self.acl).AceCount }
        }
    }

    /// Whether an allow entry for `sid` carries at least `rights`.
    fn allows(&self, sid: PSID, rights: u32) -> bool {
        (0..u32::from(self.ace_count())).any(|index| {
            let mut ace: *mut c_void = std::ptr::null_mut();
            if unsafe { GetAce(self.acl, index, &mut ace) }.is_err() || ace.is_null() {
                return false;
            }
            let ace = ace as *const ACCESS_ALLOWED_ACE;
            unsafe {
                (*ace).Header.AceType == ACCESS_ALLOWED_ACE_TYPE
                    && (*ace).Mask & rights == rights
                    && EqualSid(PSID(std::ptr::addr_of!((*ace).SidStart) as *mut c_void), sid).is_ok()
            }
        })
    }
}

/// Grant `sid` inheritable read, write and execute access on `path`,
/// keeping every existing entry.
pub fn grant_access(path: &Path, sid: PSID) -> Result<(), SandboxError> {
    let wide = as_c_str_w(path.as_os_str());
    let rights = granted_rights();

    let current = Dacl::read(&wide)?;
    if current.acl.is_null() {
        // A null DACL allows everyone.  Merging into it would produce a DACL
        // with only the new entry.
        return Err(SandboxError::Unverified {
            path: path.to_path_buf(),
            reason: "the directory has a null DACL".to_string(),
        });
    }
    let before = current.ace_count();

    let explicit = EXPLICIT_ACCESS_W {
        grfAccessPermissions: rights,
        grfAccessMode: GRANT_ACCESS,
        grfInheritance: SUB_CONTAINERS_AND_OBJECTS_INHERIT,
        Trustee: TRUSTEE_W {
            pMultipleTrustee: std::ptr::null_mut(),
            MultipleTrusteeOperation: NO_MULTIPLE_TRUSTEE,
            TrusteeForm: TRUSTEE_IS_SID,
            TrusteeType: TRUSTEE_IS_WELL_KNOWN_GROUP,
            ptstrName: PWSTR(sid.0 as *mut u16),
        },
    };

    let mut merged: *mut ACL = std::ptr::null_mut();
    let status = unsafe { SetEntriesInAclW(Some(&[explicit]), Some(current.acl as *const ACL), &mut merged) };
    let merged_box = LocalBox(merged as *mut c_void);
    check_win32("SetEntriesInAclW", status)?;

    let status = unsafe {
        SetNamedSecurityInfoW(
            PCWSTR(wide.as_ptr()),
            SE_FILE_OBJECT,
            DACL_SECURITY_INFORMATION,
            None,
            None,
            Some(merged as *const ACL),
            None,
        )
    };
    drop(merged_box);
    drop(current);
    check_win32("SetNamedSecurityInfoW", status)?;

    let updated = Dacl::read(&wide)?;
    if !updated.allows(sid, rights) {
        return Err(SandboxError::Unverified {
            path: path.to_path_buf(),
            reason: "the new entry is missing after the write".to_string(),
        });
    }
    if updated.ace_count() < before {
        return Err(SandboxError::Unverified {
            path: path.to_path_buf(),
            reason: format!(
                "the DACL shrank from {before} to {} entries",
                updated.ace_count()
            ),
        });
    }
    Ok(())
}
