// SPDX-License-Identifier: MIT

//! Antimalware Scan Interface provider.

use std::ffi::OsStr;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;
use windows::Win32::System::Antimalware::{
    AmsiInitialize, AmsiScanBuffer, AmsiUninitialize, HAMSICONTEXT,
};
use windows::core::PCWSTR;

use super::conv::as_c_str_w;
use super::error::win_err;
use super::detect;
use crate::runtime::error::SandboxError;
use crate::runtime::scan::ScanProvider;

/// An open AMSI context, closed on drop.
struct AmsiContext(HAMSICONTEXT);

// SAFETY: AMSI contexts may be used from any thread.  Access goes through
// the scanner's mutex, so the context is never closed while in use.
unsafe impl Send for AmsiContext {}

impl Drop for AmsiContext {
    fn drop(&mut self) {
        unsafe { AmsiUninitialize(self.0) };
    }
}

pub struct AmsiScanner {
    app_name: Vec<u16>,
    supported: bool,
    context: Mutex<Option<AmsiContext>>,
}

impl AmsiScanner {
    /// Checks the host for `amsi.dll`; the context itself is opened lazily.
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: as_c_str_w(OsStr::new(app_name)),
            supported: detect::amsi_available(),
            context: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<AmsiContext>>, SandboxError> {
        self.context
            .lock()
            .map_err(|_| SandboxError::setup("AMSI context lock poisoned"))
    }
}

impl ScanProvider for AmsiScanner {
    fn platform(&self) -> &'static str {
        "windows"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn is_initialized(&self) -> bool {
        self.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    fn initialize(&self) -> Result<(), SandboxError> {
        let mut context = self.lock()?;
        if context.is_none() {
            let handle = unsafe { AmsiInitialize(PCWSTR(self.app_name.as_ptr())) }
                .map_err(win_err("AmsiInitialize"))?;
            debug!("opened AMSI context");
            *context = Some(AmsiContext(handle));
        }
        Ok(())
    }

    fn uninitialize(&self) {
        if let Ok(mut context) = self.lock() {
            // Dropping the context closes it.
            context.take();
        }
    }

    fn scan_buffer(&self, content: &[u8], label: &str) -> Result<i32, SandboxError> {
        let context = self.lock()?;
        let handle = context
            .as_ref()
            .map(|c| c.0)
            .ok_or(SandboxError::Closed("AMSI context"))?;
        let length = u32::try_from(content.len())
            .map_err(|_| SandboxError::InvalidInput("content is too large to scan".to_string()))?;
        let name = as_c_str_w(OsStr::new(label));
        let result = unsafe {
            AmsiScanBuffer(
                handle,
                content.as_ptr().cast(),
                length,
                PCWSTR(name.as_ptr()),
                None, // no session: each scan is correlated on its own
            )
        }
        .map_err(win_err("AmsiScanBuffer"))?;
        Ok(result.0)
    }
}
