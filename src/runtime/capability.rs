// SPDX-License-Identifier: MIT

//! Network capability selection.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::runtime::{
    error::SandboxError,
    spawn::{SandboxProvider, SecurityPrincipal},
};

/// Well-known capabilities a sandboxed process may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityKind {
    /// Outbound internet access.
    InternetClient,
    /// Home and work network access, in both directions.
    PrivateNetworkClientServer,
}

impl CapabilityKind {
    pub fn sid(self) -> &'static str {
        match self {
            Self::InternetClient => "S-1-15-3-1",
            Self::PrivateNetworkClientServer => "S-1-15-3-3",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InternetClient => "internetClient",
            Self::PrivateNetworkClientServer => "privateNetworkClientServer",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Required,
    Optional,
}

const NETWORK_CAPABILITIES: [(CapabilityKind, Requirement); 2] = [
    (CapabilityKind::InternetClient, Requirement::Required),
    (CapabilityKind::PrivateNetworkClientServer, Requirement::Optional),
];

/// A resolved capability and its OS token.
#[derive(Debug)]
pub struct CapabilityGrant {
    pub kind: CapabilityKind,
    pub token: Box<dyn SecurityPrincipal>,
}

/// The capabilities attached to one launch.  Empty means zero permissions.
#[derive(Debug, Default)]
pub struct CapabilitySet {
    grants: Vec<CapabilityGrant>,
}

impl CapabilitySet {
    pub fn none() -> Self {
        Self::default()
    }

    /// Resolve the capabilities for a launch.
    ///
    /// Without network access no OS call is made.  With network access,
    /// failing to resolve a required capability fails the whole set; an
    /// optional one is skipped.
    pub fn select(enable_network: bool, provider: &dyn SandboxProvider) -> Result<Self, SandboxError> {
        if !enable_network {
            return Ok(Self::none());
        }

        let mut grants = Vec::with_capacity(NETWORK_CAPABILITIES.len());
        for (kind, requirement) in NETWORK_CAPABILITIES {
            match provider.resolve_capability(kind) {
                Ok(token) => {
                    debug!(capability = %kind, sid = token.principal_id(), "resolved capability");
                    grants.push(CapabilityGrant { kind, token });
                }
                Err(e) if requirement == Requirement::Optional => {
                    warn!(capability = %kind, error = %e, "skipping optional capability");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self { grants })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityGrant> {
        self.grants.iter()
    }

    pub fn kinds(&self) -> Vec<CapabilityKind> {
        self.grants.iter().map(|g| g.kind).collect()
    }
}

impl IntoIterator for CapabilitySet {
    type Item = CapabilityGrant;
    type IntoIter = std::vec::IntoIter<CapabilityGrant>;

    fn into_iter(self) -> Self::IntoIter {
        self.grants.into_iter()
    }
}
