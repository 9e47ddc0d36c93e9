// SPDX-License-Identifier: MIT

//! Sandbox for Windows.
//!
//! Processes run inside an AppContainer: a durable profile whose SID is the
//! only identity the child has, plus whatever capability SIDs the launch
//! grants.  Inspired by the Chromium sandboxing model.
//! Documentation:
//!   https://github.com/chromium/chromium/blob/main/docs/design/sandbox.md
//!   https://learn.microsoft.com/en-us/windows/win32/secauthz/appcontainer-isolation

mod acl;
mod amsi;
mod appcontainer;
mod attribute_list;
mod capabilities;
mod conv;
mod detect;
mod error;
mod launch;

use std::path::Path;
use std::sync::Arc;

use windows::Win32::Security::PSID;

pub(crate) use amsi::AmsiScanner;
use appcontainer::AppContainerSid;
use attribute_list::{SecurityCapabilities, ThreadAttribute, ThreadAttributeList};
use capabilities::CapabilitySid;
use launch::AppContainerLaunch;

use crate::runtime::{
    capability::{CapabilityKind, CapabilitySet},
    config::ProfileConfig,
    error::SandboxError,
    identity::SandboxIdentity,
    spawn::{PreparedLaunch, SandboxProvider, SecurityPrincipal},
};

pub struct WindowsSandbox {
    supported: bool,
}

impl WindowsSandbox {
    /// Checks the host for the AppContainer profile API.
    pub fn new() -> Self {
        WindowsSandbox {
            supported: detect::app_container_available(),
        }
    }
}

fn app_container_sid(principal: &dyn SecurityPrincipal) -> Result<PSID, SandboxError> {
    principal
        .as_any()
        .downcast_ref::<AppContainerSid>()
        .and_then(AppContainerSid::sid)
        .ok_or_else(|| {
            SandboxError::InvalidInput(format!(
                "{} is not an AppContainer principal",
                principal.principal_id()
            ))
        })
}

fn capability_sid(principal: &dyn SecurityPrincipal) -> Result<PSID, SandboxError> {
    principal
        .as_any()
        .downcast_ref::<CapabilitySid>()
        .map(CapabilitySid::sid)
        .ok_or_else(|| {
            SandboxError::InvalidInput(format!(
                "{} is not a capability principal",
                principal.principal_id()
            ))
        })
}

impl SandboxProvider for WindowsSandbox {
    fn platform(&self) -> &'static str {
        "windows"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create_profile(
        &self,
        profile: &ProfileConfig,
    ) -> Result<Arc<dyn SecurityPrincipal>, SandboxError> {
        Ok(Arc::new(AppContainerSid::create(profile)?))
    }

    fn derive_profile(&self, name: &str) -> Result<Arc<dyn SecurityPrincipal>, SandboxError> {
        Ok(Arc::new(AppContainerSid::derive(name)?))
    }

    fn delete_profile(&self, name: &str) -> Result<(), SandboxError> {
        AppContainerSid::delete(name)
    }

    fn grant_access(
        &self,
        path: &Path,
        principal: &dyn SecurityPrincipal,
    ) -> Result<(), SandboxError> {
        acl::grant_access(path, app_container_sid(principal)?)
    }

    fn resolve_capability(
        &self,
        kind: CapabilityKind,
    ) -> Result<Box<dyn SecurityPrincipal>, SandboxError> {
        Ok(Box::new(CapabilitySid::resolve(kind)?))
    }

    fn build_attributes(
        &self,
        identity: &SandboxIdentity,
        capabilities: CapabilitySet,
    ) -> Result<Box<dyn PreparedLaunch>, SandboxError> {
        let container = app_container_sid(identity.principal())?;
        let sids = capabilities
            .iter()
            .map(|grant| capability_sid(grant.token.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let attributes: Vec<Box<dyn ThreadAttribute>> =
            vec![Box::new(SecurityCapabilities::new(container, &sids))];
        let list = ThreadAttributeList::new(attributes)?;

        let tokens = capabilities.into_iter().map(|grant| grant.token).collect();
        Ok(Box::new(AppContainerLaunch::new(list, tokens, identity.clone())))
    }
}
