// SPDX-License-Identifier: MIT

//! Process/Thread Attribute List.
//! Because much of windows requires explicit add/remove actions,
//! wrapping it in a single struct that implements Drop will make code maintenance easier.

use windows::Win32::{
    Foundation::{ERROR_INSUFFICIENT_BUFFER, GetLastError},
    Security,
    System::Threading,
};

use super::error::win_err;
use crate::runtime::error::SandboxError;

// SE_GROUP_ENABLED: the capability is active in the child's token.
const SE_GROUP_ENABLED: u32 = 0x0000_0004;

pub trait ThreadAttribute {
    fn lp_value(&self) -> *const core::ffi::c_void;
    fn attribute(&self) -> usize;
    fn cb_size(&self) -> usize;
}

/// PROC_THREAD_ATTRIBUTE_SECURITY_CAPABILITIES: runs the child inside the
/// AppContainer with exactly the listed capabilities.
pub struct SecurityCapabilities {
    // `value.Capabilities` points into this buffer, so it must not be touched
    // after construction.
    _capabilities: Vec<Security::SID_AND_ATTRIBUTES>,
    value: Security::SECURITY_CAPABILITIES,
}

impl SecurityCapabilities {
    pub fn new(app_container: Security::PSID, capabilities: &[Security::PSID]) -> Self {
        let mut list: Vec<Security::SID_AND_ATTRIBUTES> = capabilities
            .iter()
            .map(|sid| Security::SID_AND_ATTRIBUTES {
                Sid: *sid,
                Attributes: SE_GROUP_ENABLED,
            })
            .collect();
        let value = Security::SECURITY_CAPABILITIES {
            AppContainerSid: app_container,
            Capabilities: if list.is_empty() {
                std::ptr::null_mut()
            } else {
                list.as_mut_ptr()
            },
            CapabilityCount: list.len() as u32,
            Reserved: 0,
        };
        Self {
            _capabilities: list,
            value,
        }
    }
}

impl ThreadAttribute for SecurityCapabilities {
    fn lp_value(&self) -> *const core::ffi::c_void {
        (&self.value as *const Security::SECURITY_CAPABILITIES).cast()
    }

    fn attribute(&self) -> usize {
        Threading::PROC_THREAD_ATTRIBUTE_SECURITY_CAPABILITIES as usize
    }

    fn cb_size(&self) -> usize {
        std::mem::size_of::<Security::SECURITY_CAPABILITIES>()
    }
}

pub struct ThreadAttributeList {
    // The attribute list stores pointers to these values, so they live as
    // long as the list does.  Boxed so the pointers survive moves.
    attributes: Vec<Box<dyn ThreadAttribute>>,
    // attr_buf contains the actual buffer that the attribute list uses.  It must be
    // maintained in the structure to ensure the memory is not freed while the attribute list is in use.
    _attr_buf: Vec<u8>,
    attr_list: Option<Threading::LPPROC_THREAD_ATTRIBUTE_LIST>,
}

impl ThreadAttributeList {
    pub fn new(attributes: Vec<Box<dyn ThreadAttribute>>) -> Result<Self, SandboxError> {
        if attributes.is_empty() {
            return Err(SandboxError::setup("no process attributes to set"));
        }
        let count = attributes.len() as u32;
        unsafe {
            // Get the expected size.
            // This should return an error, which should indicate insufficient buffer size, which, yes,
            // we passed a 0 size to get the size.  It's weird semantics.
            let mut attr_size: usize = 0;
            if let Err(e) = Threading::InitializeProcThreadAttributeList(
                None,           // query buffer size
                count,          // number of attributes to set
                Some(0),        // must be 0
                &mut attr_size, // output required size in bytes
            ) {
                if GetLastError() != ERROR_INSUFFICIENT_BUFFER {
                    // It's not the expected error, so it's a real error.
                    return Err(win_err("InitializeProcThreadAttributeList")(e));
                }
            }

            // Then initialize it.
            let mut attr_buf = vec![0u8; attr_size];
            let attr_list = Threading::LPPROC_THREAD_ATTRIBUTE_LIST(attr_buf.as_mut_ptr().cast::<_>());
            Threading::InitializeProcThreadAttributeList(
                Some(attr_list), // allocated buffer
                count,           // matches number of attributes to set
                Some(0),         // must be 0
                &mut attr_size,  // the computed size from the previous call
            )
            .map_err(win_err("InitializeProcThreadAttributeList"))?;

            // From here on, Drop deletes the list on every exit path.
            let ret = Self {
                attributes,
                _attr_buf: attr_buf,
                attr_list: Some(attr_list),
            };

            // Then load in the values.
            for attr in &ret.attributes {
                Threading::UpdateProcThreadAttribute(
                    attr_list, // attribute list
                    0,         // dwFlags must be 0
                    attr.attribute(),
                    Some(attr.lp_value()),
                    attr.cb_size(),
                    None, // not used; don't care about the previous value of this attribute.
                    None, // not used; don't care about the size of the not-returned previous value.
                )
                .map_err(win_err("UpdateProcThreadAttribute"))?;
            }

            Ok(ret)
        }
    }

    pub fn list(&self) -> Result<Threading::LPPROC_THREAD_ATTRIBUTE_LIST, SandboxError> {
        self.attr_list
            .ok_or_else(|| SandboxError::setup("attribute list already released"))
    }
}

impl Drop for ThreadAttributeList {
    fn drop(&mut self) {
        if let Some(list) = self.attr_list.take() {
            unsafe { Threading::DeleteProcThreadAttributeList(list) };
        }
    }
}
