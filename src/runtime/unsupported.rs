// SPDX-License-Identifier: MIT

//! Providers for hosts without sandbox or scanning support.
//!
//! Launches fail with "not supported".  Scans are reported as skipped by
//! `ContentScanner`, never as a checked clean result.

use std::{path::Path, sync::Arc};

use crate::runtime::{
    capability::{CapabilityKind, CapabilitySet},
    config::ProfileConfig,
    error::SandboxError,
    identity::SandboxIdentity,
    scan::ScanProvider,
    spawn::{PreparedLaunch, SandboxProvider, SecurityPrincipal},
};

pub struct UnsupportedSandbox {
    platform: &'static str,
}

impl UnsupportedSandbox {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }

    fn fail(&self, what: &str) -> SandboxError {
        SandboxError::not_supported(self.platform, format!("{what} requires AppContainer support"))
    }
}

impl SandboxProvider for UnsupportedSandbox {
    fn platform(&self) -> &'static str {
        self.platform
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn create_profile(&self, _: &ProfileConfig) -> Result<Arc<dyn SecurityPrincipal>, SandboxError> {
        Err(self.fail("profile creation"))
    }

    fn derive_profile(&self, _: &str) -> Result<Arc<dyn SecurityPrincipal>, SandboxError> {
        Err(self.fail("profile lookup"))
    }

    fn delete_profile(&self, name: &str) -> Result<(), SandboxError> {
        // Nothing can exist here, so teardown trivially succeeds.
        Err(SandboxError::NotFound(name.to_string()))
    }

    fn grant_access(&self, _: &Path, _: &dyn SecurityPrincipal) -> Result<(), SandboxError> {
        Err(self.fail("access grants"))
    }

    fn resolve_capability(&self, _: CapabilityKind) -> Result<Box<dyn SecurityPrincipal>, SandboxError> {
        Err(self.fail("capabilities"))
    }

    fn build_attributes(
        &self,
        _: &SandboxIdentity,
        _: CapabilitySet,
    ) -> Result<Box<dyn PreparedLaunch>, SandboxError> {
        Err(self.fail("sandboxed launch"))
    }
}

pub struct UnsupportedScanner {
    platform: &'static str,
}

impl UnsupportedScanner {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }
}

impl ScanProvider for UnsupportedScanner {
    fn platform(&self) -> &'static str {
        self.platform
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn is_initialized(&self) -> bool {
        false
    }

    fn initialize(&self) -> Result<(), SandboxError> {
        Err(SandboxError::not_supported(self.platform, "no content scanning service"))
    }

    fn uninitialize(&self) {}

    fn scan_buffer(&self, _: &[u8], _: &str) -> Result<i32, SandboxError> {
        Err(SandboxError::not_supported(self.platform, "no content scanning service"))
    }
}
