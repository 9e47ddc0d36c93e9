// SPDX-License-Identifier: MIT

//! General model for launching sandboxed processes.
//!
//! The OS work sits behind `SandboxProvider`.  The gatekeeper drives the
//! provider one step at a time so that each step can fail closed on its own.

use std::{
    any::Any,
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::runtime::{
    capability::{CapabilityKind, CapabilitySet},
    config::ProfileConfig,
    error::{LaunchError, SandboxError},
    identity::SandboxIdentity,
};

/// An OS security principal held as an owned handle.
///
/// Sandbox identities and capabilities are both principals.  The handle is
/// released when the last owner drops it.
pub trait SecurityPrincipal: Send + Sync + fmt::Debug {
    /// String form of the principal, e.g. `S-1-15-2-...`.
    fn principal_id(&self) -> &str;

    /// Allows a provider to recover its own concrete handle type.
    fn as_any(&self) -> &dyn Any;
}

/// The OS services the gatekeeper composes.
///
/// Every method performs at most one logical OS operation and never retries.
pub trait SandboxProvider: Send + Sync {
    /// Short name of the host platform, used in diagnostics.
    fn platform(&self) -> &'static str;

    /// Whether this host can run sandboxed processes at all.
    fn is_supported(&self) -> bool;

    /// Create the durable profile.  Must return `SandboxError::AlreadyExists`
    /// when a profile with the same name is already registered.
    fn create_profile(
        &self,
        profile: &ProfileConfig,
    ) -> Result<Arc<dyn SecurityPrincipal>, SandboxError>;

    /// Derive the principal of an existing profile from its name.
    fn derive_profile(&self, name: &str) -> Result<Arc<dyn SecurityPrincipal>, SandboxError>;

    /// Delete the profile.  Must return `SandboxError::NotFound` when no
    /// profile with that name exists.
    fn delete_profile(&self, name: &str) -> Result<(), SandboxError>;

    /// Add an inheritable read/write/execute entry for `principal` to the
    /// access list of `path`, keeping all existing entries.
    fn grant_access(&self, path: &Path, principal: &dyn SecurityPrincipal)
    -> Result<(), SandboxError>;

    /// Resolve a well-known capability to an OS token.
    fn resolve_capability(
        &self,
        kind: CapabilityKind,
    ) -> Result<Box<dyn SecurityPrincipal>, SandboxError>;

    /// Assemble the process-creation attributes that bind the identity and
    /// capabilities to a process that has not been created yet.
    fn build_attributes(
        &self,
        identity: &SandboxIdentity,
        capabilities: CapabilitySet,
    ) -> Result<Box<dyn PreparedLaunch>, SandboxError>;
}

/// Process-creation attributes, ready to start a process.
///
/// Dropping the value releases the attribute list and the capability tokens
/// it owns.
pub trait PreparedLaunch {
    /// Start the command line inside the sandbox with `workspace` as its
    /// working directory.  Returns the process id.  The process and thread
    /// handles are released before returning; the child is not supervised.
    fn spawn(&self, command_line: &str, workspace: &Path) -> Result<u32, SandboxError>;
}

/// Whether the sandboxed process may reach the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkPolicy {
    /// Use the configured default.
    #[default]
    Default,
    Enabled,
    Disabled,
}

impl NetworkPolicy {
    /// Resolve against the configured default.
    pub fn resolve(self, default_enabled: bool) -> bool {
        match self {
            Self::Default => default_enabled,
            Self::Enabled => true,
            Self::Disabled => false,
        }
    }
}

impl From<bool> for NetworkPolicy {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }
}

impl From<Option<bool>> for NetworkPolicy {
    fn from(enabled: Option<bool>) -> Self {
        enabled.map_or(Self::Default, Self::from)
    }
}

/// Describes one sandboxed launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// The full command line, passed to the OS unchanged.
    pub command_line: String,
    /// Directory the sandbox is granted access to, and the child's working directory.
    pub workspace: PathBuf,
    pub network: NetworkPolicy,
}

impl LaunchRequest {
    pub fn new(command_line: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            command_line: command_line.into(),
            workspace: workspace.into(),
            network: NetworkPolicy::Default,
        }
    }

    pub fn with_network(mut self, network: impl Into<NetworkPolicy>) -> Self {
        self.network = network.into();
        self
    }

    /// Check the request without touching any OS state other than reading
    /// the workspace metadata.  Returns the absolute workspace path.
    pub fn validate(&self) -> Result<PathBuf, LaunchError> {
        if self.command_line.trim().is_empty() {
            return Err(LaunchError::InvalidArguments(
                "command line is empty".to_string(),
            ));
        }
        if self.command_line.contains('\0') {
            return Err(LaunchError::InvalidArguments(
                "command line contains a NUL character".to_string(),
            ));
        }
        if self.workspace.as_os_str().is_empty() {
            return Err(LaunchError::InvalidArguments(
                "workspace path is empty".to_string(),
            ));
        }
        let workspace = full_path_name(&self.workspace).map_err(|e| {
            LaunchError::InvalidArguments(format!(
                "workspace {} is not accessible: {e}",
                self.workspace.display()
            ))
        })?;
        if !workspace.is_dir() {
            return Err(LaunchError::InvalidArguments(format!(
                "workspace {} is not a directory",
                workspace.display()
            )));
        }
        Ok(workspace)
    }
}

/// Absolute form of `path`, without the extended-length prefix that
/// `canonicalize()` produces on Windows.
pub(crate) fn full_path_name(path: &Path) -> Result<PathBuf, std::io::Error> {
    let path = path.canonicalize()?;
    let raw = path.as_os_str().as_encoded_bytes();
    match raw.strip_prefix(br"\\?\") {
        // UNC paths need the prefix to stay valid.
        Some(rest) if !rest.starts_with(br"UNC\") => {
            // SAFETY: only an ASCII prefix was removed, so `rest` still starts
            // on a character boundary of the original encoded string.
            Ok(PathBuf::from(unsafe { OsStr::from_encoded_bytes_unchecked(rest) }))
        }
        _ => Ok(path),
    }
}
