// SPDX-License-Identifier: MIT

//! Start the process inside the AppContainer.

use std::ffi::OsStr;
use std::mem;
use std::path::Path;

use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Threading;
use windows::core::{PCWSTR, PWSTR};

use super::attribute_list::ThreadAttributeList;
use super::conv::as_c_str_w;
use super::error::win_err;
use crate::runtime::error::SandboxError;
use crate::runtime::identity::SandboxIdentity;
use crate::runtime::spawn::{PreparedLaunch, SecurityPrincipal};

/// The attribute list and everything it points at.
pub struct AppContainerLaunch {
    // Field order is drop order: the list goes before the SIDs it references.
    attributes: ThreadAttributeList,
    _capabilities: Vec<Box<dyn SecurityPrincipal>>,
    _identity: SandboxIdentity,
}

impl AppContainerLaunch {
    pub fn new(
        attributes: ThreadAttributeList,
        capabilities: Vec<Box<dyn SecurityPrincipal>>,
        identity: SandboxIdentity,
    ) -> Self {
        Self {
            attributes,
            _capabilities: capabilities,
            _identity: identity,
        }
    }
}

impl PreparedLaunch for AppContainerLaunch {
    fn spawn(&self, command_line: &str, workspace: &Path) -> Result<u32, SandboxError> {
        // CreateProcessW may write into the command line buffer.
        let mut cmdline = as_c_str_w(OsStr::new(command_line));
        let cwd = as_c_str_w(workspace.as_os_str());

        unsafe {
            let mut si_ex: Threading::STARTUPINFOEXW = mem::zeroed();
            si_ex.StartupInfo.cb = mem::size_of::<Threading::STARTUPINFOEXW>() as u32;
            si_ex.lpAttributeList = self.attributes.list()?;

            let mut pi: Threading::PROCESS_INFORMATION = mem::zeroed();

            Threading::CreateProcessW(
                PCWSTR::null(),                   // application name comes from the command line
                Some(PWSTR(cmdline.as_mut_ptr())), // command line
                None,                             // process attributes
                None,                             // thread attributes
                false,                            // no handles are inherited
                Threading::EXTENDED_STARTUPINFO_PRESENT // use extended startup information
                | Threading::CREATE_UNICODE_ENVIRONMENT // unicode environment block
                | Threading::CREATE_NEW_CONSOLE, // fresh console for the child
                None,                   // inherit the environment
                PCWSTR(cwd.as_ptr()),   // start in the workspace
                &si_ex.StartupInfo,     // STARTUPINFOEXW
                &mut pi,                // process information
            )
            .map_err(win_err("CreateProcessW"))?;

            // The child is not supervised; release both handles now.
            let _ = CloseHandle(pi.hThread);
            let _ = CloseHandle(pi.hProcess);

            Ok(pi.dwProcessId)
        }
    }
}
