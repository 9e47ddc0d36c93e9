// SPDX-License-Identifier: MIT

//! The durable sandbox identity.
//!
//! The profile outlives the process, so creating it a second time reports
//! "already exists".  That case is handled by deriving the identity from the
//! profile name instead.  The result is cached for the life of the resolver.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::runtime::{
    config::ProfileConfig,
    error::SandboxError,
    spawn::{SandboxProvider, SecurityPrincipal},
};

/// The principal the OS assigned to the resolved profile.
#[derive(Debug, Clone)]
pub struct SandboxIdentity {
    principal: Arc<dyn SecurityPrincipal>,
}

impl SandboxIdentity {
    pub fn new(principal: Arc<dyn SecurityPrincipal>) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &dyn SecurityPrincipal {
        self.principal.as_ref()
    }

    pub fn principal_id(&self) -> &str {
        self.principal.principal_id()
    }
}

pub struct IdentityResolver {
    profile: ProfileConfig,
    cached: Mutex<Option<SandboxIdentity>>,
}

impl IdentityResolver {
    pub fn new(profile: ProfileConfig) -> Self {
        Self {
            profile,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached identity, or create/derive it.
    ///
    /// The lock is held across the OS calls so that concurrent first callers
    /// perform the create-or-derive sequence once.
    pub fn resolve(&self, provider: &dyn SandboxProvider) -> Result<SandboxIdentity, SandboxError> {
        let mut cached = self.lock()?;
        if let Some(identity) = cached.as_ref() {
            return Ok(identity.clone());
        }

        let principal = match provider.create_profile(&self.profile) {
            Ok(principal) => {
                info!(profile = %self.profile.name, sid = principal.principal_id(), "created sandbox profile");
                principal
            }
            Err(SandboxError::AlreadyExists(_)) => {
                debug!(profile = %self.profile.name, "sandbox profile exists; deriving its identity");
                provider.derive_profile(&self.profile.name)?
            }
            Err(e) => return Err(e),
        };

        let identity = SandboxIdentity::new(principal);
        *cached = Some(identity.clone());
        Ok(identity)
    }

    /// The cached identity, without touching the OS.
    pub fn current(&self) -> Option<SandboxIdentity> {
        self.lock().ok().and_then(|c| c.clone())
    }

    /// String form of the cached principal, or an empty string when nothing
    /// has been resolved yet.
    pub fn principal_id(&self) -> String {
        self.current()
            .map(|i| i.principal_id().to_string())
            .unwrap_or_default()
    }

    /// Delete the durable profile.
    ///
    /// A profile that is already gone counts as success.  The cache is only
    /// cleared when the profile is known to be gone.
    pub fn teardown(&self, provider: &dyn SandboxProvider) -> Result<(), SandboxError> {
        let mut cached = self.lock()?;
        match provider.delete_profile(&self.profile.name) {
            Ok(()) => {
                info!(profile = %self.profile.name, "deleted sandbox profile");
            }
            Err(SandboxError::NotFound(_)) => {
                debug!(profile = %self.profile.name, "sandbox profile was already absent");
            }
            Err(e) => {
                warn!(profile = %self.profile.name, error = %e, "failed to delete sandbox profile");
                return Err(e);
            }
        }
        *cached = None;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SandboxIdentity>>, SandboxError> {
        self.cached
            .lock()
            .map_err(|_| SandboxError::setup("identity cache lock poisoned"))
    }
}
