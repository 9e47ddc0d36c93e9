// SPDX-License-Identifier: MIT

//! The gatekeeper composes the sandbox steps into one all-or-nothing launch,
//! and the scanner into the scan-before-launch protocol.
//!
//! Launch order: identity, workspace access, capabilities, attributes,
//! process.  The first failure ends the attempt and no process exists
//! afterwards.  Nothing is retried and there is no unsandboxed fallback.

use std::{num::NonZeroU32, path::Path};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::runtime::{
    capability::CapabilitySet,
    config::GatekeeperConfig,
    error::{ErrorKind, LaunchError, SandboxError},
    identity::IdentityResolver,
    scan::{ContentScanner, ScanProvider, ScanRequest, ScanVerdict},
    spawn::{LaunchRequest, NetworkPolicy, SandboxProvider},
};

/// Progress of one launch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStage {
    Idle,
    IdentityResolved,
    AccessGranted,
    CapabilitiesSelected,
    AttributesBuilt,
    Launched(NonZeroU32),
    Failed(ErrorKind),
}

struct StageTracker {
    stage: LaunchStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: LaunchStage::Idle,
        }
    }

    fn advance(&mut self, next: LaunchStage) {
        debug!(from = ?self.stage, to = ?next, "launch stage");
        self.stage = next;
    }

    fn fail(&mut self, err: LaunchError) -> LaunchError {
        self.advance(LaunchStage::Failed(err.kind()));
        warn!(code = err.code(), error = %err, cause = ?err.cause(), "sandboxed launch failed");
        err
    }
}

/// What the host offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub os: &'static str,
    pub sandbox_supported: bool,
    pub scanner_available: bool,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("script rejected by content scan: {}", .0.description())]
    Rejected(ScanVerdict),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

pub struct Gatekeeper {
    config: GatekeeperConfig,
    sandbox: Box<dyn SandboxProvider>,
    scanner: ContentScanner,
    identity: IdentityResolver,
}

impl Gatekeeper {
    pub fn new(
        config: GatekeeperConfig,
        sandbox: Box<dyn SandboxProvider>,
        scanner: Box<dyn ScanProvider>,
    ) -> Self {
        let identity = IdentityResolver::new(config.profile.clone());
        Self {
            config,
            sandbox,
            scanner: ContentScanner::new(scanner),
            identity,
        }
    }

    /// Gatekeeper backed by the providers this host supports.
    pub fn for_host(config: GatekeeperConfig) -> Self {
        let (sandbox, scanner) = crate::runtime::host_providers(&config);
        Self::new(config, sandbox, scanner)
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Start `request.command_line` inside the sandbox and return its process id.
    pub fn launch(&self, request: &LaunchRequest) -> Result<NonZeroU32, LaunchError> {
        let mut tracker = StageTracker::new();

        if !self.sandbox.is_supported() {
            return Err(tracker.fail(LaunchError::Unsupported(self.sandbox.platform())));
        }
        let workspace = request.validate().map_err(|e| tracker.fail(e))?;

        let identity = self
            .identity
            .resolve(self.sandbox.as_ref())
            .map_err(|e| tracker.fail(LaunchError::ProfileCreationFailed(e)))?;
        tracker.advance(LaunchStage::IdentityResolved);

        self.sandbox
            .grant_access(&workspace, identity.principal())
            .map_err(|e| tracker.fail(LaunchError::AclFailure(e)))?;
        tracker.advance(LaunchStage::AccessGranted);

        let enable_network = request.network.resolve(self.config.launch.network_by_default);
        if request.network == NetworkPolicy::Default && enable_network {
            warn!("network access not specified; enabling it by default");
        }
        let capabilities = CapabilitySet::select(enable_network, self.sandbox.as_ref())
            .map_err(|e| tracker.fail(LaunchError::CapabilityError(e)))?;
        debug!(capabilities = ?capabilities.kinds(), "selected capabilities");
        tracker.advance(LaunchStage::CapabilitiesSelected);

        let prepared = self
            .sandbox
            .build_attributes(&identity, capabilities)
            .map_err(|e| tracker.fail(LaunchError::ProcessCreationFailed(e)))?;
        tracker.advance(LaunchStage::AttributesBuilt);

        let pid = prepared
            .spawn(&request.command_line, &workspace)
            .and_then(|pid| {
                NonZeroU32::new(pid)
                    .ok_or_else(|| SandboxError::setup("process creation reported process id 0"))
            })
            .map_err(|e| tracker.fail(LaunchError::ProcessCreationFailed(e)))?;
        tracker.advance(LaunchStage::Launched(pid));

        info!(
            pid = pid.get(),
            sid = identity.principal_id(),
            workspace = %workspace.display(),
            network = enable_network,
            "launched sandboxed process"
        );
        Ok(pid)
    }

    pub fn scan_buffer(&self, content: &[u8], label: &str) -> ScanVerdict {
        self.scanner.scan(&ScanRequest::new(content, label))
    }

    pub fn scan_file(&self, path: &Path) -> ScanVerdict {
        self.scanner.scan_file(path)
    }

    /// Scan the script and only launch it when the verdict is clean.
    pub fn scan_then_launch(
        &self,
        script: &[u8],
        label: &str,
        request: &LaunchRequest,
    ) -> Result<NonZeroU32, GateError> {
        let verdict = self.scan_buffer(script, label);
        if !verdict.clean() {
            return Err(GateError::Rejected(verdict));
        }
        if verdict.is_skipped() {
            debug!(label, "content scan skipped; continuing to launch");
        }
        Ok(self.launch(request)?)
    }

    /// String form of the cached sandbox identity, or empty when none has
    /// been resolved by this gatekeeper.
    pub fn identity_principal(&self) -> String {
        self.identity.principal_id()
    }

    /// Create or derive the sandbox identity without launching anything.
    pub fn resolve_identity(&self) -> Result<String, LaunchError> {
        if !self.sandbox.is_supported() {
            return Err(LaunchError::Unsupported(self.sandbox.platform()));
        }
        let identity = self
            .identity
            .resolve(self.sandbox.as_ref())
            .map_err(LaunchError::ProfileCreationFailed)?;
        Ok(identity.principal_id().to_string())
    }

    /// Delete the durable profile.  Returns true when it no longer exists.
    pub fn teardown_identity(&self) -> bool {
        self.identity.teardown(self.sandbox.as_ref()).is_ok()
    }

    pub fn platform_info(&self) -> PlatformInfo {
        PlatformInfo {
            os: self.sandbox.platform(),
            sandbox_supported: self.sandbox.is_supported(),
            scanner_available: self.scanner.is_available(),
        }
    }

    /// Release the scanning context.
    pub fn shutdown_scanner(&self) {
        self.scanner.shutdown();
    }
}
